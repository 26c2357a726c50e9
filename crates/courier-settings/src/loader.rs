//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PipelineSettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply `COURIER_*` environment variable overrides (highest priority)
//! 4. Apply floors and validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use courier_core::{DebugMode, NetworkPolicy};

use crate::errors::Result;
use crate::types::PipelineSettings;

/// Resolve the default settings path (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PipelineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PipelineSettings> {
    let defaults = serde_json::to_value(PipelineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PipelineSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    let settings = settings.normalized();
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_env_overrides(settings: &mut PipelineSettings) {
    if let Some(v) = read_env_string("COURIER_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = read_env_u64("COURIER_FLUSH_INTERVAL_MS", 0, 86_400_000) {
        settings.flush_interval_ms = v;
    }
    if let Some(v) = read_env_u64("COURIER_FLUSH_BULK_SIZE", 0, 1_000_000) {
        settings.flush_bulk_size = v;
    }
    if let Some(v) = read_env_u64("COURIER_BATCH_SIZE", 1, 10_000) {
        settings.batch_size = usize::try_from(v).unwrap_or(settings.batch_size);
    }
    if let Some(v) = read_env_u64("COURIER_MAX_CACHE_SIZE", 0, u64::MAX) {
        settings.max_cache_size = v;
    }
    if let Some(v) = read_env_string("COURIER_DEBUG_MODE") {
        match parse_debug_mode(&v) {
            Some(mode) => settings.debug_mode = mode,
            None => tracing::warn!(key = "COURIER_DEBUG_MODE", value = %v, "invalid debug mode, ignoring"),
        }
    }
    if let Some(v) = read_env_bool("COURIER_DEBUG_MODE_DISABLED") {
        settings.debug_mode_disabled = v;
    }
    if let Some(v) = read_env_bool("COURIER_SDK_DISABLED") {
        settings.sdk_disabled = v;
    }
    if let Some(v) = read_env_u64("COURIER_NETWORK_POLICY", 0, 255) {
        settings.network_policy = NetworkPolicy::from_bits(u8::try_from(v).unwrap_or(u8::MAX));
    }
    if let Some(v) = read_env_bool("COURIER_NETWORK_REQUESTS") {
        settings.network_requests_enabled = v;
    }
    if let Some(v) = read_env_string("COURIER_COOKIE") {
        settings.cookie = Some(v);
    }
    if let Some(v) = read_env_bool("COURIER_TRACK_APP_CRASH") {
        settings.track_app_crash = v;
    }
    if let Some(v) = read_env_bool("COURIER_LOG") {
        settings.log_enabled = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a debug mode name (`off`, `debug_only`, `debug_and_track`, or the camelCase forms).
pub fn parse_debug_mode(val: &str) -> Option<DebugMode> {
    match val.to_lowercase().replace(['_', '-'], "").as_str() {
        "off" | "none" => Some(DebugMode::Off),
        "debugonly" => Some(DebugMode::DebugOnly),
        "debugandtrack" => Some(DebugMode::DebugAndTrack),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
