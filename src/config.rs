//! Configuration management for the OBD exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (`OBD_EXPORTER_<SECTION>__<KEY>`, e.g.
//!   `OBD_EXPORTER_DEVICE__ADDRESS`)
//! - Command-line arguments (the serial device override)

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which diagnostic device implementation to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// ELM327-compatible adapter on a serial device node
    #[default]
    Elm327,
    /// In-process fake vehicle, useful without hardware
    Simulated,
}

/// Diagnostic device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device path to open (e.g., "/dev/ttyUSB0")
    #[serde(default = "default_device_address")]
    pub address: String,

    /// Device implementation
    #[serde(default)]
    pub kind: DeviceKind,

    /// Deadline for a single adapter command in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Serial line speed for ELM327 adapters
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Acquisition loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Delay between successful polling cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before reconnecting after a session failure in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl AcquisitionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format (text, json)
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Main configuration structure for the OBD exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Diagnostic device configuration
    #[serde(default)]
    pub device: DeviceConfig,

    /// Acquisition loop configuration
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,
}

fn default_device_address() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_command_timeout_ms() -> u64 {
    5_000
}

fn default_baud_rate() -> u32 {
    38_400
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_backoff_ms() -> u64 {
    2_000
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: default_device_address(),
            kind: DeviceKind::default(),
            command_timeout_ms: default_command_timeout_ms(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to configuration file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use obd_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("OBD_EXPORTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Replace the device address, as the `--serial-device` flag does.
    pub fn with_device_address(mut self, address: impl Into<String>) -> Result<Self> {
        self.device.address = address.into();
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration settings.
    fn validate(&self) -> Result<()> {
        let checks = [
            (self.device.address.is_empty(), "device address cannot be empty"),
            (
                self.device.command_timeout_ms == 0,
                "device command timeout must be positive",
            ),
            (
                self.device.baud_rate == 0,
                "device baud rate must be positive",
            ),
            (
                self.acquisition.poll_interval_ms == 0,
                "acquisition poll interval must be positive",
            ),
            (
                self.acquisition.backoff_ms == 0,
                "acquisition backoff must be positive",
            ),
            (
                self.exporter.listen_address.is_empty(),
                "listen address cannot be empty",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(config::ConfigError::Message(message.to_string()).into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.device.address, "/dev/ttyUSB0");
        assert_eq!(settings.device.kind, DeviceKind::Elm327);
        assert_eq!(settings.device.baud_rate, 38_400);
        assert_eq!(settings.acquisition.poll_interval(), Duration::from_millis(10));
        assert_eq!(settings.acquisition.backoff(), Duration::from_secs(2));
        assert_eq!(settings.exporter.listen_address, "0.0.0.0:8080");
        assert_eq!(settings.exporter.log_format, LogFormat::Text);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load(Some("does/not/exist.toml")).unwrap();
        assert_eq!(settings.acquisition.backoff_ms, 2_000);
        assert_eq!(settings.device.command_timeout_ms, 5_000);
    }

    #[test]
    fn test_device_override() {
        let settings = Settings::default()
            .with_device_address("/dev/rfcomm0")
            .unwrap();
        assert_eq!(settings.device.address, "/dev/rfcomm0");
    }

    #[test]
    fn test_validation_rejects_empty_device() {
        assert!(Settings::default().with_device_address("").is_err());
    }

    #[test]
    fn test_validation_rejects_zero_backoff() {
        let mut settings = Settings::default();
        settings.acquisition.backoff_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_baud_rate() {
        let mut settings = Settings::default();
        settings.device.baud_rate = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("OBD_EXPORTER_DEVICE__ADDRESS", "/dev/rfcomm1");
        std::env::set_var("OBD_EXPORTER_DEVICE__BAUD_RATE", "115200");
        let loaded = Settings::load(None);
        std::env::remove_var("OBD_EXPORTER_DEVICE__ADDRESS");
        std::env::remove_var("OBD_EXPORTER_DEVICE__BAUD_RATE");

        let settings = loaded.unwrap();
        assert_eq!(settings.device.address, "/dev/rfcomm1");
        assert_eq!(settings.device.baud_rate, 115_200);
    }

    #[test]
    fn test_device_kind_parses_lowercase() {
        let kind: DeviceKind = serde_json::from_str(r#""simulated""#).unwrap();
        assert_eq!(kind, DeviceKind::Simulated);
    }
}
