//! Engine configuration
//!
//! Read from the JSON file named by `AUDIOMANCER_CONFIG`, otherwise from
//! `<config dir>/audiomancer/config.json` when present. Every field has a
//! default so partial files are fine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::device::AudioConfig;
use crate::audio::lifecycle::ActivationPolicy;
use crate::error::ConfigError;

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "AUDIOMANCER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Also append to the log file
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    /// Output device name; None uses the system default
    pub output_device: Option<String>,
    pub activation: ActivationPolicy,
    /// Most voices one pattern may schedule
    pub graph_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            output_device: None,
            activation: ActivationPolicy::default(),
            graph_capacity: 1024,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("audiomancer").join("config.json"))
    }

    /// Load from the environment override, the default path, or fall back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "audiomancer-{}-{}.json",
            name,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.graph_capacity, 1024);
        assert_eq!(config.activation, ActivationPolicy::RequireGesture);
        assert_eq!(config.logging.level, "info");
        assert!(config.output_device.is_none());
    }

    #[test]
    fn test_partial_file() {
        let path = temp_file(
            "partial",
            r#"{"activation": "immediate", "audio": {"buffer_size": 256}, "logging": {"file": false}}"#,
        );
        let config = EngineConfig::from_path(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(config.activation, ActivationPolicy::Immediate);
        assert_eq!(config.audio.buffer_size, 256);
        assert_eq!(config.audio.sample_rate, 44100);
        assert!(!config.logging.file);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_file() {
        let path = temp_file("invalid", "{ not json");
        let result = EngineConfig::from_path(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_path(Path::new("/nonexistent/audiomancer.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
