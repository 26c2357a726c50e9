//! # courier-settings
//!
//! Configuration for the courier pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PipelineSettings::default()`]
//! 2. **Settings file**: `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `COURIER_*` overrides (highest priority)
//!
//! Floors (minimum flush interval, bulk threshold, cache ceiling) are applied
//! after all layers. The loaded value is then wrapped in a [`SharedSettings`]
//! handle so the endpoint, debug mode and network policy can change at runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod shared;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use shared::SharedSettings;
pub use types::*;
