//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::actuator::ServoLimits;
use crate::error::{FlapError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub pwm: PwmConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// USB serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Sysfs PWM channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PwmConfig {
    #[serde(default = "default_pwm_chip")]
    pub chip: String,

    #[serde(default)]
    pub channel: u32,

    /// Length of one duty tick in nanoseconds
    #[serde(default = "default_tick_ns")]
    pub tick_ns: u64,
}

/// Servo pulse limits, in PWM ticks
#[derive(Debug, Deserialize, Clone)]
pub struct ServoConfig {
    #[serde(default = "default_period")]
    pub period: u16,

    #[serde(default = "default_servo_min")]
    pub min: u16,

    #[serde(default = "default_servo_rest")]
    pub rest: u16,

    #[serde(default = "default_servo_max")]
    pub max: u16,

    #[serde(default = "default_run_offset")]
    pub run_offset: u16,
}

/// Limit switch (gpio-keys) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_limits_enabled")]
    pub enabled: bool,

    #[serde(default = "default_limits_device")]
    pub device_path: String,

    /// Key code reported when the flap reaches the open stop
    #[serde(default = "default_open_key")]
    pub open_key: u16,

    /// Key code reported when the flap reaches the closed stop
    #[serde(default = "default_close_key")]
    pub close_key: u16,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stdout only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_timeout_ms() -> u64 { 10 }
fn default_poll_interval_ms() -> u64 { 1 }

fn default_pwm_chip() -> String { "/sys/class/pwm/pwmchip0".to_string() }
fn default_tick_ns() -> u64 { 400 }

fn default_period() -> u16 { 50000 }
fn default_servo_min() -> u16 { 2000 }
fn default_servo_rest() -> u16 { 3750 }
fn default_servo_max() -> u16 { 5000 }
fn default_run_offset() -> u16 { 100 }

fn default_limits_enabled() -> bool { true }
fn default_limits_device() -> String { "/dev/input/by-path/platform-gpio-keys-event".to_string() }
fn default_open_key() -> u16 { 59 } // KEY_F1
fn default_close_key() -> u16 { 60 } // KEY_F2

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            chip: default_pwm_chip(),
            channel: 0,
            tick_ns: default_tick_ns(),
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            min: default_servo_min(),
            rest: default_servo_rest(),
            max: default_servo_max(),
            run_offset: default_run_offset(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: default_limits_enabled(),
            device_path: default_limits_device(),
            open_key: default_open_key(),
            close_key: default_close_key(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl ServoConfig {
    pub fn limits(&self) -> ServoLimits {
        ServoLimits {
            period: self.period,
            min: self.min,
            rest: self.rest,
            max: self.max,
            run_offset: self.run_offset,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> FlapError {
    FlapError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flap_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 1000 {
            return Err(invalid("timeout_ms must be between 1 and 1000"));
        }

        if self.serial.poll_interval_ms == 0 || self.serial.poll_interval_ms > 100 {
            return Err(invalid("poll_interval_ms must be between 1 and 100"));
        }

        if self.pwm.chip.is_empty() {
            return Err(invalid("pwm chip cannot be empty"));
        }

        if self.pwm.tick_ns == 0 {
            return Err(invalid("tick_ns must be greater than 0"));
        }

        self.validate_servo()?;

        if self.limits.enabled {
            if self.limits.device_path.is_empty() {
                return Err(invalid("limits device_path cannot be empty when enabled"));
            }

            if self.limits.open_key == self.limits.close_key {
                return Err(invalid("open_key and close_key must differ"));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }

    fn validate_servo(&self) -> Result<()> {
        let servo = &self.servo;

        if servo.period == 0 {
            return Err(invalid("servo period must be greater than 0"));
        }

        if !(servo.min < servo.rest && servo.rest < servo.max) {
            return Err(invalid("servo limits must satisfy min < rest < max"));
        }

        if servo.max > servo.period {
            return Err(invalid("servo max cannot exceed the period"));
        }

        if servo.run_offset == 0 {
            return Err(invalid("run_offset must be greater than 0"));
        }

        let open = servo.rest as u32 + servo.run_offset as u32;
        let close = servo.rest as i32 - servo.run_offset as i32;
        if open > servo.max as u32 || close < servo.min as i32 {
            return Err(invalid(format!(
                "rest +/- run_offset must stay within {}..={}",
                servo.min, servo.max
            )));
        }

        Ok(())
    }
}
