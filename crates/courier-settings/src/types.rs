//! Pipeline tunables.
//!
//! Floors are applied by [`PipelineSettings::normalized`], never by serde,
//! so a settings file may hold any value and still load.

use serde::{Deserialize, Serialize};

use courier_core::{DebugMode, NetworkPolicy};

use crate::errors::{Result, SettingsError};

/// Default flush interval in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 15_000;
/// Minimum flush interval in milliseconds.
pub const MIN_FLUSH_INTERVAL_MS: u64 = 5_000;
/// Default row count above which an enqueue flushes immediately.
pub const DEFAULT_FLUSH_BULK_SIZE: u64 = 100;
/// Minimum bulk threshold.
pub const MIN_FLUSH_BULK_SIZE: u64 = 50;
/// Default records per upload outside sandbox mode.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Default local footprint ceiling in bytes (32 MiB).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 32 * 1024 * 1024;
/// Minimum local footprint ceiling in bytes (16 MiB).
pub const MIN_MAX_CACHE_SIZE: u64 = 16 * 1024 * 1024;
/// Default wait after the crash-path flush, in milliseconds.
pub const DEFAULT_CRASH_FLUSH_WAIT_MS: u64 = 3_000;
/// Default capacity of the dispatcher command channel.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 64;

/// Everything the pipeline can be tuned with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Collection endpoint. Empty disables uploads.
    pub server_url: String,
    /// Delay before a debounced flush runs, in milliseconds.
    pub flush_interval_ms: u64,
    /// Row count above which an enqueue flushes immediately.
    pub flush_bulk_size: u64,
    /// Records per upload outside sandbox mode.
    pub batch_size: usize,
    /// Local footprint ceiling in bytes.
    pub max_cache_size: u64,
    /// Sandbox mode.
    pub debug_mode: DebugMode,
    /// Remote kill switch for sandbox mode; forces [`DebugMode::Off`].
    pub debug_mode_disabled: bool,
    /// Remote kill switch: stop collecting and uploading entirely.
    pub sdk_disabled: bool,
    /// Connectivity classes on which uploads may run.
    pub network_policy: NetworkPolicy,
    /// Master switch for all network requests.
    pub network_requests_enabled: bool,
    /// Session cookie sent with every upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    /// Event types that flush as soon as they are enqueued.
    pub immediate_event_types: Vec<String>,
    /// Record an `AppCrashed` event from the panic hook.
    pub track_app_crash: bool,
    /// Bounded wait after the crash-path flush, in milliseconds.
    pub crash_flush_wait_ms: u64,
    /// Whether informational logging is on.
    pub log_enabled: bool,
    /// Capacity of the dispatcher command channel.
    pub command_queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            flush_bulk_size: DEFAULT_FLUSH_BULK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            debug_mode: DebugMode::Off,
            debug_mode_disabled: false,
            sdk_disabled: false,
            network_policy: NetworkPolicy::default(),
            network_requests_enabled: true,
            cookie: None,
            immediate_event_types: vec!["track_signup".to_string()],
            track_app_crash: false,
            crash_flush_wait_ms: DEFAULT_CRASH_FLUSH_WAIT_MS,
            log_enabled: true,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

impl PipelineSettings {
    /// Defaults pointed at `server_url`.
    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Apply floors to the numeric tunables.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.flush_interval_ms = self.flush_interval_ms.max(MIN_FLUSH_INTERVAL_MS);
        self.flush_bulk_size = self.flush_bulk_size.max(MIN_FLUSH_BULK_SIZE);
        self.batch_size = self.batch_size.max(1);
        self.max_cache_size = self.max_cache_size.max(MIN_MAX_CACHE_SIZE);
        self.command_queue_capacity = self.command_queue_capacity.max(1);
        self
    }

    /// Reject values no floor can fix.
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "serverUrl must be an http(s) URL, got {url:?}"
            )));
        }
        Ok(())
    }

    /// Debug mode after the remote override.
    pub fn effective_debug_mode(&self) -> DebugMode {
        if self.debug_mode_disabled {
            DebugMode::Off
        } else {
            self.debug_mode
        }
    }

    /// Records per upload for the current mode.
    pub fn effective_batch_size(&self) -> usize {
        if self.effective_debug_mode().is_sandbox() {
            1
        } else {
            self.batch_size.max(1)
        }
    }

    /// Whether `event_type` is a "send-now" kind.
    pub fn is_immediate_event(&self, event_type: &str) -> bool {
        self.immediate_event_types.iter().any(|t| t == event_type)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
