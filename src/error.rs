//! Error types for the OBD exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application. Everything the diagnostic
//! adapter can do wrong is folded into [`DeviceError`], which the
//! acquisition loop treats as "device unavailable" and retries.

use thiserror::Error;

/// Main error type for OBD exporter operations.
#[derive(Debug, Error)]
pub enum ObdError {
    /// The diagnostic device could not be reached or misbehaved
    #[error("Device unavailable: {0}")]
    Device(#[from] DeviceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the diagnostic session collaborator.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Opening, reading or writing the device failed
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The adapter did not answer before the command deadline
    #[error("command {command:?} timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// The adapter closed the stream
    #[error("device disconnected")]
    Disconnected,

    /// The adapter answered with an error marker or garbage
    #[error("unexpected response to {command:?}: {response:?}")]
    Protocol { command: String, response: String },

    /// The vehicle did not answer a query
    #[error("no data for {0:?}")]
    NoData(String),
}

impl From<prometheus::Error> for ObdError {
    fn from(err: prometheus::Error) -> Self {
        ObdError::Metrics(err.to_string())
    }
}

/// Result type alias for OBD exporter operations.
pub type Result<T> = std::result::Result<T, ObdError>;
