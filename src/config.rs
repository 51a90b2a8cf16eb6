//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every timing constant in the core (retry intervals, send cadence, air
//! staleness threshold, publish rate, freshness window) is configurable
//! here; the defaults match the deployed system.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Open/idle retry interval in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Minimum spacing between outbound packets (10 ms = 100 Hz)
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Air-latency staleness threshold in milliseconds
    #[serde(default = "default_air_timeout_ms")]
    pub air_timeout_ms: u64,
}

/// Referee broker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Status publish cadence in Hz
    #[serde(default = "default_publish_hz")]
    pub publish_hz: u32,

    /// Referee freshness window in milliseconds
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,
}

/// Control input mapping configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Velocity magnitude mapped to i16 full scale, per axis
    #[serde(default = "default_max_axis")]
    pub max_axis_x: f64,

    #[serde(default = "default_max_axis")]
    pub max_axis_y: f64,

    #[serde(default = "default_max_axis")]
    pub max_wheel: f64,
}

// Default value functions
fn default_baud_rate() -> u32 { 115_200 }
fn default_retry_interval_ms() -> u64 { 100 }
fn default_send_interval_ms() -> u64 { 10 }
fn default_air_timeout_ms() -> u64 { 100 }

fn default_client_id() -> String { "arena-hud".to_string() }
fn default_publish_hz() -> u32 { 10 }
fn default_freshness_ms() -> u64 { 1000 }

fn default_max_axis() -> f64 { 32768.0 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            retry_interval_ms: default_retry_interval_ms(),
            send_interval_ms: default_send_interval_ms(),
            air_timeout_ms: default_air_timeout_ms(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            retry_interval_ms: default_retry_interval_ms(),
            publish_hz: default_publish_hz(),
            freshness_ms: default_freshness_ms(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_axis_x: default_max_axis(),
            max_axis_y: default_max_axis(),
            max_wheel: default_max_axis(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        fn invalid(msg: impl std::fmt::Display) -> crate::error::HudError {
            crate::error::HudError::Config(toml::de::Error::custom(msg))
        }

        if self.serial.retry_interval_ms == 0 || self.serial.retry_interval_ms > 60_000 {
            return Err(invalid("serial retry_interval_ms must be between 1 and 60000"));
        }
        if self.serial.send_interval_ms == 0 || self.serial.send_interval_ms > 1000 {
            return Err(invalid("send_interval_ms must be between 1 and 1000"));
        }
        if self.serial.air_timeout_ms == 0 || self.serial.air_timeout_ms > 10_000 {
            return Err(invalid("air_timeout_ms must be between 1 and 10000"));
        }

        if self.broker.client_id.is_empty() {
            return Err(invalid("broker client_id cannot be empty"));
        }
        if self.broker.retry_interval_ms == 0 || self.broker.retry_interval_ms > 60_000 {
            return Err(invalid("broker retry_interval_ms must be between 1 and 60000"));
        }
        if self.broker.publish_hz == 0 || self.broker.publish_hz > 100 {
            return Err(invalid("publish_hz must be between 1 and 100"));
        }
        if self.broker.freshness_ms == 0 || self.broker.freshness_ms > 60_000 {
            return Err(invalid("freshness_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("max_axis_x", self.input.max_axis_x),
            ("max_axis_y", self.input.max_axis_y),
            ("max_wheel", self.input.max_wheel),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{} must be a positive finite number", name)));
            }
        }

        Ok(())
    }
}
