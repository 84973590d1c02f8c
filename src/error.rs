//! # Error Types
//!
//! Custom error types for Flap Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Flap Bridge
#[derive(Debug, Error)]
pub enum FlapError {
    /// Link protocol errors (packet construction, framing)
    #[error("Link protocol error: {0}")]
    Protocol(String),

    /// Serial transport errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No usable serial device could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// PWM peripheral errors
    #[error("PWM error: {0}")]
    Pwm(String),

    /// Limit switch input errors
    #[error("Limit switch error: {0}")]
    LimitSwitch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Flap Bridge
pub type Result<T> = std::result::Result<T, FlapError>;
