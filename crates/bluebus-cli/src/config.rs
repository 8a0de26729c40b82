//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bluebus_core::{DispatchPolicy, SessionConfig};
use serde::{Deserialize, Serialize};

/// Discovery timeout used when neither the flag nor the file sets one.
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Per-call timeout in seconds
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,

    /// Discovery timeout in seconds (0 waits forever)
    #[serde(default)]
    pub discovery_timeout_secs: Option<u64>,

    /// Capacity of signal channels
    #[serde(default)]
    pub event_buffer: Option<usize>,

    /// Deliver notifications for one characteristic one at a time, in order
    #[serde(default)]
    pub serialize_notifications: bool,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluebus")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`. Unreadable or malformed files fall back to
    /// defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Build session settings, letting `call_timeout` (from the command
    /// line) override the file.
    pub fn session_config(&self, call_timeout: Option<u64>) -> SessionConfig {
        let mut session = SessionConfig::default();
        if let Some(secs) = call_timeout.or(self.call_timeout_secs) {
            session = session.call_timeout(Duration::from_secs(secs));
        }
        if let Some(capacity) = self.event_buffer {
            session = session.event_buffer(capacity);
        }
        if self.serialize_notifications {
            session = session.dispatch(DispatchPolicy::SerializedPerPath);
        }
        session
    }

    /// Resolve the discovery timeout: flag, then file, then default
    pub fn discovery_timeout(&self, flag: Option<u64>) -> Duration {
        Duration::from_secs(
            flag.or(self.discovery_timeout_secs)
                .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            call_timeout_secs = 8
            discovery_timeout_secs = 30
            event_buffer = 16
            serialize_notifications = true
            "#,
        )
        .unwrap();
        assert_eq!(config.call_timeout_secs, Some(8));
        assert_eq!(config.discovery_timeout_secs, Some(30));
        assert_eq!(config.event_buffer, Some(16));
        assert!(config.serialize_notifications);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_session_config_flag_overrides_file() {
        let config = Config {
            call_timeout_secs: Some(8),
            event_buffer: Some(4),
            serialize_notifications: true,
            ..Default::default()
        };
        let session = config.session_config(Some(2));
        assert_eq!(session.call_timeout, Duration::from_secs(2));
        assert_eq!(session.event_buffer, 4);
        assert_eq!(session.dispatch, DispatchPolicy::SerializedPerPath);

        let session = config.session_config(None);
        assert_eq!(session.call_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_session_config_defaults() {
        let session = Config::default().session_config(None);
        assert_eq!(session.call_timeout, bluebus_core::DEFAULT_CALL_TIMEOUT);
        assert_eq!(session.dispatch, DispatchPolicy::Concurrent);
    }

    #[test]
    fn test_discovery_timeout_resolution() {
        let config = Config {
            discovery_timeout_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(config.discovery_timeout(Some(0)), Duration::ZERO);
        assert_eq!(config.discovery_timeout(None), Duration::from_secs(30));
        assert_eq!(
            Config::default().discovery_timeout(None),
            Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_malformed_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "event_buffer = \"lots\"").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "discovery_timeout_secs = 20\n").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.discovery_timeout_secs, Some(20));
        assert!(!config.serialize_notifications);
    }
}
