//! Session configuration.
//!
//! Loading flow:
//! 1. Start with compiled [`SessionConfig::default()`]
//! 2. If a JSON file is given and exists, merge its keys over the defaults
//! 3. Apply `AMP_*` environment variable overrides (highest priority)
//!
//! The resulting value is immutable and handed to every session explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ConfigError, Result};

/// Env var overriding [`SessionConfig::max_queue_depth`].
pub const ENV_MAX_QUEUE_DEPTH: &str = "AMP_MAX_QUEUE_DEPTH";
/// Env var overriding [`SessionConfig::heartbeat_interval_ms`].
pub const ENV_HEARTBEAT_INTERVAL_MS: &str = "AMP_HEARTBEAT_INTERVAL_MS";

/// Per-session tunables, fixed at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Output queue length above which the client is disconnected.
    pub max_queue_depth: usize,
    /// Idle time after the last write before an alive message is queued.
    pub heartbeat_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 128,
            heartbeat_interval_ms: 32_000,
        }
    }
}

impl SessionConfig {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reject values the session loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "max_queue_depth must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from defaults and environment only.
pub fn load_config() -> Result<SessionConfig> {
    let mut config = SessionConfig::default();
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Load configuration from a JSON file with env var overrides.
///
/// A missing file yields defaults. Unknown keys are ignored; invalid JSON is
/// an error.
pub fn load_config_from_path(path: &Path) -> Result<SessionConfig> {
    let defaults = serde_json::to_value(SessionConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading session config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        merge(defaults, user)
    } else {
        debug!(?path, "session config file not found, using defaults");
        defaults
    };

    let mut config: SessionConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Merge `source` keys over `target`, skipping nulls in `source`.
fn merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                if !value.is_null() {
                    let _ = target_map.insert(key, value);
                }
            }
            Value::Object(target_map)
        }
        (target, Value::Null) => target,
        (_, source) => source,
    }
}

/// Apply `AMP_*` environment overrides. Invalid values are logged and ignored.
pub fn apply_env_overrides(config: &mut SessionConfig) {
    if let Some(v) = read_env(ENV_MAX_QUEUE_DEPTH, |s| parse_usize_range(s, 1, 1_000_000)) {
        config.max_queue_depth = v;
    }
    if let Some(v) = read_env(ENV_HEARTBEAT_INTERVAL_MS, |s| {
        parse_u64_range(s, 10, 3_600_000)
    }) {
        config.heartbeat_interval_ms = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_env<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.max_queue_depth, 128);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(32));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_queue_depth_is_invalid() {
        let cfg = SessionConfig {
            max_queue_depth: 0,
            ..SessionConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::InvalidValue(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let cfg = SessionConfig {
            heartbeat_interval_ms: 0,
            ..SessionConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::InvalidValue(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.max_queue_depth, SessionConfig::default().max_queue_depth);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_queue_depth": 16}}"#).unwrap();
        let cfg = load_config_from_path(file.path()).unwrap();
        assert_eq!(cfg.max_queue_depth, 16);
        assert_eq!(cfg.heartbeat_interval_ms, 32_000);
    }

    #[test]
    fn null_and_unknown_keys_are_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_queue_depth": null, "heartbeat_interval_ms": 500, "colour": "blue"}}"#
        )
        .unwrap();
        let cfg = load_config_from_path(file.path()).unwrap();
        assert_eq!(cfg.max_queue_depth, 128);
        assert_eq!(cfg.heartbeat_interval_ms, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert_matches!(load_config_from_path(file.path()), Err(ConfigError::Json(_)));
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_queue_depth": 0}}"#).unwrap();
        assert_matches!(
            load_config_from_path(file.path()),
            Err(ConfigError::InvalidValue(_))
        );
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_usize_range("64", 1, 100), Some(64));
        assert_eq!(parse_usize_range(" 64 ", 1, 100), Some(64));
        assert_eq!(parse_usize_range("0", 1, 100), None);
        assert_eq!(parse_usize_range("101", 1, 100), None);
        assert_eq!(parse_usize_range("-3", 1, 100), None);
        assert_eq!(parse_u64_range("32000", 10, 3_600_000), Some(32_000));
        assert_eq!(parse_u64_range("5", 10, 3_600_000), None);
        assert_eq!(parse_u64_range("soon", 10, 3_600_000), None);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = SessionConfig {
            max_queue_depth: 7,
            heartbeat_interval_ms: 1_500,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
