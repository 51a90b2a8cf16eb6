//! # Error Types
//!
//! Custom error types for Arena HUD using `thiserror`.
//!
//! No error in this crate is fatal to the process: connection errors are
//! retried at a fixed interval, I/O errors force a link reset, and malformed
//! data is logged and discarded. Staleness is modelled as absent data, not
//! as an error.

use thiserror::Error;

/// Main error type for Arena HUD
#[derive(Debug, Error)]
pub enum HudError {
    /// Serial port open or I/O failure (forces a link reset, retried)
    #[error("serial error: {0}")]
    Serial(String),

    /// MQTT broker connect or session failure (retried)
    #[error("broker error: {0}")]
    Broker(String),

    /// A telemetry line with the wrong shape (logged, line discarded)
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Bytes-to-text or JSON decode failure (logged, unit discarded)
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Arena HUD
pub type Result<T> = std::result::Result<T, HudError>;
