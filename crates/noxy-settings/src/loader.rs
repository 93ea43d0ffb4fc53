//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use noxy_core::QoS;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::NoxySettings;

/// Resolve the default settings path (`~/.noxy/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".noxy").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<NoxySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NoxySettings> {
    let defaults = serde_json::to_value(NoxySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: NoxySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
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

/// Apply `NOXY_*` environment overrides. Invalid values are warned about and ignored.
pub fn apply_env_overrides(settings: &mut NoxySettings) {
    if let Some(v) = read_env_string("NOXY_BROKER_ADDRESS") {
        settings.mqtt.broker_address = v;
    }
    if let Some(v) = read_env_parsed("NOXY_BROKER_PORT", |s| parse_u64_range(s, 1, 65_535)) {
        settings.mqtt.port = v as u16;
    }
    if let Some(v) = read_env_parsed("NOXY_QOS", parse_qos) {
        settings.mqtt.qos = v;
    }
    if let Some(v) = read_env_parsed("NOXY_AUTO_REPLY_DELAY_MS", |s| s.trim().parse::<i64>().ok()) {
        settings.auto_reply.delay_ms = v;
    }
    if let Some(v) = read_env_parsed("NOXY_BUTTON_COUNT", |s| parse_u64_range(s, 1, 128)) {
        settings.interfaces.button_count = v as u32;
    }
    if let Some(v) = read_env_parsed("NOXY_VJOY_DEVICE", |s| parse_u64_range(s, 1, 16)) {
        settings.interfaces.vjoy_device = v as u32;
    }
    if let Some(v) = read_env_string("NOXY_AUDIO_DIR") {
        settings.audio.presets_dir = v;
    }
    if let Some(v) = read_env_string("NOXY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_qos(val: &str) -> Option<QoS> {
    let level: u8 = val.trim().parse().ok()?;
    QoS::try_from(level).ok()
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_parsed<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}
