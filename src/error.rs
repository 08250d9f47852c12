//! Error types shared by the transport and controller layers

use crate::config::TransportMode;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by either transport variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Discovery or connect failed, or the transport is not connected
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Write or protocol-level failure during an exchange
    #[error("Command failed: {0}")]
    Command(String),

    /// A bounded wait expired
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    pub(crate) fn not_connected() -> Self {
        TransportError::Connection("Not connected to peer".into())
    }
}

/// Invalid controller or device configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Mode '{0}' not supported. Use one of: point-to-point, stream-socket")]
    UnsupportedMode(String),

    #[error("An address is required for {0} mode")]
    MissingAddress(TransportMode),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read device file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse device file: {0}")]
    DeviceFile(#[from] serde_json::Error),
}
