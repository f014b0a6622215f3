//! Node configuration management.
//!
//! Handles loading, saving, and validating tripwire configuration including:
//! - MQTT broker address and topic layout
//! - Sensor pin and initial tuning (threshold, bounce interval)
//!
//! Runtime retuning via the control protocol is deliberately not written
//! back here; the file only describes the node's startup state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tunables::{
    Tunables, MAX_TRIGGER_THRESHOLD, MIN_BOUNCE_INTERVAL_MS, MIN_TRIGGER_THRESHOLD,
};

/// Highest BCM pin number on the 40-pin header.
const MAX_BCM_PIN: u8 = 27;

/// Main node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// MQTT broker and topic layout.
    pub broker: BrokerConfig,

    /// Sensing parameters applied at startup.
    pub sensor: SensorConfig,
}

/// MQTT broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or IP address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Client identifier presented to the broker.
    pub client_id: String,

    /// Topic the node subscribes to for control messages.
    pub control_topic: String,

    /// Topic the node publishes alarms, echoes, and heartbeats on.
    pub message_topic: String,
}

/// Sensor wiring and initial tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// BCM pin the detector's digital output is wired to.
    pub pin: u8,

    /// Stage increments required to raise an alarm. 1-10.
    pub threshold: u8,

    /// Minimum spacing between accepted raw triggers, in milliseconds.
    /// At least 100.
    pub bounce_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "tripwire-node".to_string(),
            control_topic: "tripwire/control".to_string(),
            message_topic: "tripwire/message".to_string(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            pin: 16,
            threshold: 3,
            bounce_interval_ms: 300,
        }
    }
}

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file exists but is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field failed range validation.
    #[error("{field}: {message}")]
    Validation {
        /// Which field failed.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// No platform configuration directory could be determined.
    #[error("cannot determine configuration directory")]
    NoConfigDir,
}

impl NodeConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Loaded values are validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the platform configuration file path.
    ///
    /// On Raspberry Pi: `/etc/tripwire/config.toml`.
    /// For development elsewhere: the user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration directory can be determined.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/tripwire/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "tripwire")
                .ok_or(ConfigError::NoConfigDir)?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }

    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.is_empty() {
            return Err(ConfigError::Validation {
                field: "broker.host",
                message: "must not be empty".to_string(),
            });
        }
        if self.broker.control_topic.is_empty() || self.broker.message_topic.is_empty() {
            return Err(ConfigError::Validation {
                field: "broker.control_topic",
                message: "topics must not be empty".to_string(),
            });
        }
        if self.broker.control_topic == self.broker.message_topic {
            return Err(ConfigError::Validation {
                field: "broker.message_topic",
                message: "must differ from control_topic, or the node hears its own echoes"
                    .to_string(),
            });
        }
        if self.sensor.pin > MAX_BCM_PIN {
            return Err(ConfigError::Validation {
                field: "sensor.pin",
                message: format!("BCM pin numbers run 0-{MAX_BCM_PIN}"),
            });
        }
        if !(MIN_TRIGGER_THRESHOLD..=MAX_TRIGGER_THRESHOLD).contains(&self.sensor.threshold) {
            return Err(ConfigError::Validation {
                field: "sensor.threshold",
                message: format!(
                    "must be between {MIN_TRIGGER_THRESHOLD} and {MAX_TRIGGER_THRESHOLD}"
                ),
            });
        }
        if self.sensor.bounce_interval_ms < MIN_BOUNCE_INTERVAL_MS {
            return Err(ConfigError::Validation {
                field: "sensor.bounce_interval_ms",
                message: format!("must be at least {MIN_BOUNCE_INTERVAL_MS}"),
            });
        }
        Ok(())
    }

    /// Initial tunables derived from the sensor table.
    #[must_use]
    pub fn tunables(&self) -> Tunables {
        Tunables::new(self.sensor.threshold, self.sensor.bounce_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.sensor.threshold, 3);
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = NodeConfig::default();
        config.sensor.pin = 21;
        config.sensor.bounce_interval_ms = 450;
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.sensor.pin, 21);
        assert_eq!(loaded.sensor.bounce_interval_ms, 450);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let mut config = NodeConfig::default();
        config.sensor.threshold = 11;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation {
                field: "sensor.threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_bounce_below_floor_is_rejected() {
        let mut config = NodeConfig::default();
        config.sensor.bounce_interval_ms = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identical_topics_are_rejected() {
        let mut config = NodeConfig::default();
        config.broker.message_topic = config.broker.control_topic.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loading_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = NodeConfig::default();
        config.sensor.threshold = 0;
        // Bypass validation by serializing directly.
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        assert!(NodeConfig::load(&path).is_err());
    }

    #[test]
    fn test_tunables_derived_from_sensor_table() {
        let config = NodeConfig::default();
        let tunables = config.tunables();
        assert_eq!(tunables.trigger_threshold, 3);
        assert_eq!(tunables.bounce_interval_ms, 300);
        assert!(!tunables.sensing_enabled);
    }
}
