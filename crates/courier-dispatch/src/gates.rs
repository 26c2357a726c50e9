//! Pre-flight checks run before every flush.
//!
//! A failing gate skips the whole flush and leaves the store untouched.

use std::fmt;

use serde::Serialize;

use courier_core::{DeviceState, NetworkClass};
use courier_settings::PipelineSettings;

/// Why a flush did not run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "gate")]
pub enum SkipReason {
    /// The pipeline is switched off remotely.
    SdkDisabled,
    /// Network requests are switched off.
    NetworkDisabled,
    /// No collection endpoint is configured.
    NoServerUrl,
    /// This process does not own delivery.
    SecondaryProcess,
    /// The device has no connectivity.
    Offline,
    /// The current connectivity class is not in the upload policy.
    PolicyDisallows {
        /// Class reported by the device.
        class: NetworkClass,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SdkDisabled => f.write_str("sdk disabled"),
            Self::NetworkDisabled => f.write_str("network requests disabled"),
            Self::NoServerUrl => f.write_str("server url is empty"),
            Self::SecondaryProcess => f.write_str("not the primary process"),
            Self::Offline => f.write_str("no connectivity"),
            Self::PolicyDisallows { class } => write!(f, "network {class} not allowed by policy"),
        }
    }
}

/// Run the gates in order; the first failure wins.
pub fn check(settings: &PipelineSettings, device: &dyn DeviceState) -> Result<(), SkipReason> {
    if settings.sdk_disabled {
        return Err(SkipReason::SdkDisabled);
    }
    if !settings.network_requests_enabled {
        return Err(SkipReason::NetworkDisabled);
    }
    if settings.server_url.trim().is_empty() {
        return Err(SkipReason::NoServerUrl);
    }
    if !device.is_primary_process() {
        return Err(SkipReason::SecondaryProcess);
    }
    let class = device.network_class();
    if class == NetworkClass::Offline {
        return Err(SkipReason::Offline);
    }
    if !settings.network_policy.allows(class) {
        return Err(SkipReason::PolicyDisallows { class });
    }
    Ok(())
}
