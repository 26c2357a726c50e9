//! Connectivity classes, the upload network policy, and the device probe.
//!
//! The pipeline never inspects the platform directly. A [`DeviceState`]
//! implementation supplied by the host answers the pre-flight questions
//! the dispatcher asks before every flush.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Current connectivity class of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    /// No connectivity.
    Offline,
    /// 2G cellular.
    Mobile2G,
    /// 3G cellular.
    Mobile3G,
    /// 4G cellular.
    Mobile4G,
    /// 5G cellular.
    Mobile5G,
    /// Wi-Fi.
    Wifi,
    /// Connected, but the class could not be determined.
    Unknown,
}

impl NetworkClass {
    /// Policy bit(s) this class requires.
    fn policy_bits(self) -> u8 {
        match self {
            Self::Offline => 0,
            Self::Mobile2G => NetworkPolicy::MOBILE_2G.0,
            Self::Mobile3G => NetworkPolicy::MOBILE_3G.0,
            Self::Mobile4G => NetworkPolicy::MOBILE_4G.0,
            Self::Mobile5G => NetworkPolicy::MOBILE_5G.0,
            Self::Wifi => NetworkPolicy::WIFI.0,
            Self::Unknown => NetworkPolicy::ALL.0,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Offline => "offline",
            Self::Mobile2G => "2g",
            Self::Mobile3G => "3g",
            Self::Mobile4G => "4g",
            Self::Mobile5G => "5g",
            Self::Wifi => "wifi",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Bitmask of connectivity classes on which uploads are allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkPolicy(u8);

impl NetworkPolicy {
    /// Uploads never allowed.
    pub const NONE: Self = Self(0);
    /// 2G cellular.
    pub const MOBILE_2G: Self = Self(1);
    /// 3G cellular.
    pub const MOBILE_3G: Self = Self(1 << 1);
    /// 4G cellular.
    pub const MOBILE_4G: Self = Self(1 << 2);
    /// Wi-Fi.
    pub const WIFI: Self = Self(1 << 3);
    /// 5G cellular.
    pub const MOBILE_5G: Self = Self(1 << 4);
    /// Every class.
    pub const ALL: Self = Self(0xFF);

    /// Build a policy from raw bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether an upload may run on `class`.
    pub fn allows(self, class: NetworkClass) -> bool {
        self.0 & class.policy_bits() != 0
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::MOBILE_3G | Self::MOBILE_4G | Self::WIFI | Self::MOBILE_5G
    }
}

impl BitOr for NetworkPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Host-provided answers to the dispatcher's pre-flight questions.
pub trait DeviceState: Send + Sync {
    /// Current connectivity class. [`NetworkClass::Offline`] when there is none.
    fn network_class(&self) -> NetworkClass;

    /// Whether this process owns delivery. Secondary processes only enqueue.
    fn is_primary_process(&self) -> bool {
        true
    }
}

/// A device that is always online over Wi-Fi in the primary process.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

impl DeviceState for AlwaysOnline {
    fn network_class(&self) -> NetworkClass {
        NetworkClass::Wifi
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
