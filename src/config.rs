//! Configuration management for mavftp-verify
//!
//! Every value has a built-in default. An optional `mavftp-verify.toml` in the
//! working directory (or an explicit file) and `MAVFTP_VERIFY_*` environment
//! variables override them, e.g. `MAVFTP_VERIFY_TRANSFER__MAX_ATTEMPTS=5`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::protocol::MAX_DATA_LEN;

const DEFAULT_CONFIG_NAME: &str = "mavftp-verify";
const ENV_PREFIX: &str = "MAVFTP_VERIFY";

/// Complete client configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub link: LinkConfig,
    pub transfer: TransferConfig,
    pub verify: VerifyConfig,
    pub emulator: EmulatorConfig,
}

/// Link session settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkConfig {
    /// How long to wait for the device heartbeat
    pub handshake_timeout_secs: u64,

    /// Our own MAVLink identity (ground station)
    pub system_id: u8,
    pub component_id: u8,
}

/// Transfer driver settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransferConfig {
    /// Timeout of a single request/response attempt
    pub response_timeout_ms: u64,

    /// Attempts per exchange, including the first one
    pub max_attempts: u32,

    /// Bytes per Put/Get chunk, capped by the link's maximum payload
    pub chunk_size: usize,
}

/// Upload-and-verify cycle settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VerifyConfig {
    /// Remote directory receiving the uploaded file
    pub remote_dir: String,

    /// Appended to the local filename to name the read-back copy
    pub side_file_suffix: String,

    /// List the remote directory between put and get
    pub list_parent: bool,

    /// COMMAND_LONG param1 / param6 sent with the restart request
    pub restart_param1: f32,
    pub restart_param6: f32,
}

/// Device emulator settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmulatorConfig {
    pub system_id: u8,
    pub component_id: u8,
    pub heartbeat_interval_ms: u64,

    /// Largest data field the emulated device accepts or returns
    pub max_payload: usize,

    /// Peers silent for this long stop receiving heartbeats
    pub peer_idle_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10,
            system_id: 255,
            component_id: 190,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            max_attempts: 3,
            chunk_size: MAX_DATA_LEN,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            remote_dir: "/APM/scripts".to_string(),
            side_file_suffix: "_back".to_string(),
            list_parent: true,
            restart_param1: 1.0,
            restart_param6: 20190226.0,
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 1,
            heartbeat_interval_ms: 1000,
            max_payload: MAX_DATA_LEN,
            peer_idle_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load configuration from an explicit file (required) or the default
    /// file (optional), with environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text on top of the defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.link.handshake_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "link.handshake_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.transfer.response_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "transfer.response_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.transfer.max_attempts == 0 {
            return Err(ConfigError::Message(
                "transfer.max_attempts must be greater than 0".into(),
            ));
        }

        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::Message(
                "transfer.chunk_size must be greater than 0".into(),
            ));
        }

        if self.verify.side_file_suffix.is_empty() {
            return Err(ConfigError::Message(
                "verify.side_file_suffix cannot be empty".into(),
            ));
        }

        if self.emulator.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Message(
                "emulator.heartbeat_interval_ms must be greater than 0".into(),
            ));
        }

        if self.emulator.max_payload == 0 || self.emulator.max_payload > MAX_DATA_LEN {
            return Err(ConfigError::Message(format!(
                "emulator.max_payload must be between 1 and {}",
                MAX_DATA_LEN
            )));
        }

        if self.emulator.peer_idle_secs == 0 {
            return Err(ConfigError::Message(
                "emulator.peer_idle_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl LinkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl TransferConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl EmulatorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn peer_idle(&self) -> Duration {
        Duration::from_secs(self.peer_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.transfer.max_attempts, 3);
        assert_eq!(config.transfer.response_timeout(), Duration::from_secs(10));
        assert_eq!(config.transfer.chunk_size, MAX_DATA_LEN);
        assert_eq!(config.link.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.verify.remote_dir, "/APM/scripts");
        assert_eq!(config.verify.side_file_suffix, "_back");
        assert!(config.verify.list_parent);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            [transfer]
            max_attempts = 5
            chunk_size = 128

            [verify]
            remote_dir = "/scripts"
            list_parent = false
            "#,
        )
        .unwrap();
        assert_eq!(config.transfer.max_attempts, 5);
        assert_eq!(config.transfer.chunk_size, 128);
        assert_eq!(config.transfer.response_timeout_ms, 10_000);
        assert_eq!(config.verify.remote_dir, "/scripts");
        assert!(!config.verify.list_parent);
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let result = ClientConfig::from_toml("[transfer]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(ConfigError::Message(_))));
    }

    #[test]
    fn oversized_emulator_payload_is_rejected() {
        let result = ClientConfig::from_toml("[emulator]\nmax_payload = 240\n");
        assert!(matches!(result, Err(ConfigError::Message(_))));
    }

    #[test]
    fn zero_peer_idle_is_rejected() {
        let result = ClientConfig::from_toml("[emulator]\npeer_idle_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Message(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = ClientConfig::load(Some(Path::new("/nonexistent/mavftp-verify.toml")));
        assert!(result.is_err());
    }
}
