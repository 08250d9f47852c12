//! Controller, transport and device wiring configuration

use crate::error::ConfigError;
use bluer::{Address, Uuid};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Nordic UART Service, advertised by the peer firmware
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Characteristic the host writes commands to
pub const NUS_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Characteristic the peer answers on (read and/or notify)
pub const NUS_RESPONSE_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Default TCP port of the peer's command server
pub const DEFAULT_TCP_PORT: u16 = 8080;

/// The closed set of transport variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Short-range, connection-oriented link (BLE GATT)
    #[default]
    PointToPoint,
    /// TCP stream to a host/port pair
    StreamSocket,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::PointToPoint => write!(f, "point-to-point"),
            TransportMode::StreamSocket => write!(f, "stream-socket"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point-to-point" | "bluetooth" | "ble" => Ok(TransportMode::PointToPoint),
            "stream-socket" | "wifi" | "tcp" => Ok(TransportMode::StreamSocket),
            _ => Err(ConfigError::UnsupportedMode(s.to_string())),
        }
    }
}

/// Configuration for the BLE transport
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Service the peer must advertise to be selected during discovery
    pub service_uuid: Uuid,
    /// Command characteristic
    pub write_char_uuid: Uuid,
    /// Response characteristic
    pub response_char_uuid: Uuid,
    /// Known peer address; skips scanning when set
    pub peer_address: Option<Address>,
    /// How long to scan before giving up
    pub scan_timeout: Duration,
    /// Bound on the GATT connect
    pub connect_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            service_uuid: NUS_SERVICE_UUID,
            write_char_uuid: NUS_WRITE_CHAR_UUID,
            response_char_uuid: NUS_RESPONSE_CHAR_UUID,
            peer_address: None,
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for the TCP transport
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Size of the single read performed per response
    pub read_buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_TCP_PORT,
            connect_timeout: Duration::from_secs(5),
            read_buffer_size: linkbrain_protocol::limits::MAX_RESPONSE_SIZE,
        }
    }
}

/// Top-level configuration for a [`Controller`](crate::controller::Controller)
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mode: TransportMode,
    /// MAC address (point-to-point) or host name / IP (stream-socket)
    pub address: Option<String>,
    /// TCP port, stream-socket only
    pub port: u16,
    /// Connect timeout for either transport
    pub timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::PointToPoint,
            address: None,
            port: DEFAULT_TCP_PORT,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    fn validate_timeout(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Derive the BLE transport configuration
    pub fn ble_config(&self) -> Result<BleConfig, ConfigError> {
        self.validate_timeout()?;

        let peer_address = match self.address.as_deref() {
            Some(addr) => Some(
                addr.parse::<Address>()
                    .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))?,
            ),
            None => None,
        };

        Ok(BleConfig {
            peer_address,
            connect_timeout: self.timeout,
            ..Default::default()
        })
    }

    /// Derive the TCP transport configuration
    pub fn tcp_config(&self) -> Result<TcpConfig, ConfigError> {
        self.validate_timeout()?;

        let host = match self.address.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(ConfigError::MissingAddress(self.mode)),
        };
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port",
                reason: "must be non-zero".into(),
            });
        }

        Ok(TcpConfig {
            host,
            port: self.port,
            connect_timeout: self.timeout,
            ..Default::default()
        })
    }
}

/// Kinds of device façade that can be wired to a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Fan,
    Door,
    Window,
    EnergyMonitor,
}

/// One entry of the device wiring file
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub kind: DeviceKind,
    pub pin: u8,
    /// Line voltage, energy monitors only
    #[serde(default)]
    pub voltage: Option<f64>,
    /// Sensor calibration factor, energy monitors only
    #[serde(default)]
    pub calibration_factor: Option<f64>,
}

/// Parse a device wiring document (a JSON array of [`DeviceSpec`])
pub fn parse_device_specs(raw: &str) -> Result<Vec<DeviceSpec>, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

/// Load the device wiring file
pub fn load_device_specs(path: impl AsRef<Path>) -> Result<Vec<DeviceSpec>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_device_specs(&raw)
}
