//! Common error types for sensorlink.
//!
//! This module provides a centralized Error enum using thiserror,
//! with conversions from underlying error types used throughout the crate.

use thiserror::Error;

/// Main error type for sensorlink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed configuration file
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device driver errors
    #[error("Device error: {0}")]
    Device(String),

    /// No registered driver recognizes the device name
    #[error("No driver for device '{0}'")]
    NoDriver(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
