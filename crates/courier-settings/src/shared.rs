//! Runtime-mutable settings shared between producers and the dispatcher.

use std::sync::Arc;

use parking_lot::RwLock;

use courier_core::{DebugMode, NetworkPolicy};

use crate::types::PipelineSettings;

/// Cheap-to-clone handle over the live settings.
///
/// Readers take a [`snapshot`](Self::snapshot); the dispatcher snapshots once
/// per flush so a flush never sees a half-applied change.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<PipelineSettings>>,
}

impl SharedSettings {
    /// Wrap settings after applying floors.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.normalized())),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> PipelineSettings {
        self.inner.read().clone()
    }

    /// Read one value without cloning everything.
    pub fn read<T>(&self, f: impl FnOnce(&PipelineSettings) -> T) -> T {
        f(&self.inner.read())
    }

    /// Change the collection endpoint.
    pub fn set_server_url(&self, url: impl Into<String>) {
        self.inner.write().server_url = url.into();
    }

    /// Change the sandbox mode.
    pub fn set_debug_mode(&self, mode: DebugMode) {
        self.inner.write().debug_mode = mode;
    }

    /// Force sandbox mode off regardless of `debug_mode`.
    pub fn set_debug_mode_disabled(&self, disabled: bool) {
        self.inner.write().debug_mode_disabled = disabled;
    }

    /// Turn the whole pipeline off or back on.
    pub fn set_sdk_disabled(&self, disabled: bool) {
        self.inner.write().sdk_disabled = disabled;
    }

    /// Change the upload network policy.
    pub fn set_network_policy(&self, policy: NetworkPolicy) {
        self.inner.write().network_policy = policy;
    }

    /// Turn all network requests on or off.
    pub fn set_network_requests_enabled(&self, enabled: bool) {
        self.inner.write().network_requests_enabled = enabled;
    }

    /// Change the flush interval; the floor still applies.
    pub fn set_flush_interval_ms(&self, interval_ms: u64) {
        let mut settings = self.inner.write();
        settings.flush_interval_ms = interval_ms.max(crate::types::MIN_FLUSH_INTERVAL_MS);
    }
}
