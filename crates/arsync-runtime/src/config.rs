//! Session configuration
//!
//! Read from JSON; durations are human strings such as `"400ms"` or `"2s"`.
//! Missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use arsync_core::{ArError, ArResult};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the server target
pub const TARGET_ENV: &str = "ARSYNC_TARGET";

/// Session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Server address, `host:port`
    pub target: String,
    /// Budget for one connection attempt
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
    /// Connection attempts per channel change, at least one is made
    pub retries: u32,
    /// Capacity of the robot event channel
    pub event_buffer: usize,
    /// Interval of the background ticker
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, `RUST_LOG` takes precedence
    pub filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            target: "127.0.0.1:50051".to_string(),
            connect_timeout: Duration::from_millis(400),
            retries: 1,
            event_buffer: 256,
            tick_interval: Duration::from_millis(16),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> ArResult<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| ArError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ArResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ArError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> ArResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_target_override(std::env::var(TARGET_ENV).ok());
    }

    fn apply_target_override(&mut self, target: Option<String>) {
        if let Some(target) = target.filter(|t| !t.trim().is_empty()) {
            tracing::debug!(%target, "server target overridden from environment");
            self.target = target;
        }
    }

    pub fn validate(&self) -> ArResult<()> {
        if self.target.trim().is_empty() {
            return Err(ArError::Config("target must not be empty".into()));
        }
        if self.event_buffer == 0 {
            return Err(ArError::Config("event_buffer must be at least 1".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ArError::Config("connect_timeout must be positive".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(ArError::Config("tick_interval must be positive".into()));
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> ArResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ArError::Config(e.to_string()))
    }
}

/// `Duration` as a humantime string
mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(400));
        assert_eq!(config.retries, 1);
        assert_eq!(config.event_buffer, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json_str(
            r#"{ "target": "10.0.0.7:50051", "connect_timeout": "2s", "log": { "json": true } }"#,
        )
        .unwrap();

        assert_eq!(config.target, "10.0.0.7:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.tick_interval, Duration::from_millis(16));
        assert!(config.log.json);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_json_round_trip() {
        let config = SessionConfig {
            retries: 4,
            tick_interval: Duration::from_millis(33),
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert!(json.contains("\"33ms\""));
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SessionConfig::from_json_str(r#"{ "event_buffer": 0 }"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{ "connect_timeout": "soon" }"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{ "target": " " }"#).is_err());
    }

    #[test]
    fn test_target_override() {
        let mut config = SessionConfig::default();
        config.apply_target_override(Some("robot-cell:6000".into()));
        assert_eq!(config.target, "robot-cell:6000");

        config.apply_target_override(Some(String::new()));
        assert_eq!(config.target, "robot-cell:6000");
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::from_file("/nonexistent/arsync.json").unwrap_err();
        assert!(matches!(err, ArError::Config(_)));
    }
}
