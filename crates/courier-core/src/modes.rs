//! Debug (sandbox) modes.

use serde::{Deserialize, Serialize};

/// Development-time delivery mode.
///
/// Any mode other than [`DebugMode::Off`] is a sandbox: one record per
/// upload and every enqueue flushes immediately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebugMode {
    /// Normal batched delivery.
    #[default]
    Off,
    /// Sandbox delivery; the server validates but does not persist.
    DebugOnly,
    /// Sandbox delivery; the server validates and persists.
    DebugAndTrack,
}

impl DebugMode {
    /// Whether sandbox rules apply.
    pub fn is_sandbox(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Whether requests carry the "do not persist" marker header.
    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::DebugOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_flags() {
        assert!(!DebugMode::Off.is_sandbox());
        assert!(DebugMode::DebugOnly.is_sandbox());
        assert!(DebugMode::DebugAndTrack.is_sandbox());

        assert!(DebugMode::DebugOnly.is_dry_run());
        assert!(!DebugMode::DebugAndTrack.is_dry_run());
        assert!(!DebugMode::Off.is_dry_run());
    }

    #[test]
    fn serde_names() {
        let mode: DebugMode = serde_json::from_str(r#""debugAndTrack""#).unwrap();
        assert_eq!(mode, DebugMode::DebugAndTrack);
        assert_eq!(serde_json::to_string(&DebugMode::Off).unwrap(), r#""off""#);
    }
}
