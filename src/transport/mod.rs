//! Transports to the embedded peer
//!
//! Two variants share one capability surface (`connect`, `disconnect`,
//! `send`, `is_connected`):
//! - point-to-point: BLE GATT, acknowledgement mode detected once per session
//! - stream-socket: TCP, newline-framed request/response

pub mod ble;
pub mod ble_discovery;
pub mod tcp;
pub mod traits;

pub use ble::{BleTransport, BluerConnector, BluerLink};
pub use ble_discovery::BleDiscovery;
pub use tcp::TcpTransport;
pub use traits::{GattLink, NotificationStream, PeripheralConnector, ResponseChannel};

use crate::error::TransportError;
use linkbrain_protocol::{Command, Response};

/// How a command is acknowledged by the peer, fixed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Reply arrives as a GATT notification; silence is treated as success
    Notify,
    /// Reply is read from the response characteristic after the write
    PollableRead,
    /// No response channel; success is synthesized after the write
    FireAndForget,
    /// Reply record always expected on the stream
    Response,
}

/// Lifecycle of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(AckMode),
}

/// The closed set of transport variants
pub enum Transport {
    PointToPoint(BleTransport),
    StreamSocket(TcpTransport),
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::PointToPoint(t) => t.name(),
            Transport::StreamSocket(t) => t.name(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            Transport::PointToPoint(t) => t.state(),
            Transport::StreamSocket(t) => t.state(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Transport::PointToPoint(t) => t.is_connected(),
            Transport::StreamSocket(t) => t.is_connected(),
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        match self {
            Transport::PointToPoint(t) => t.connect().await,
            Transport::StreamSocket(t) => t.connect().await,
        }
    }

    pub async fn disconnect(&mut self) {
        match self {
            Transport::PointToPoint(t) => t.disconnect().await,
            Transport::StreamSocket(t) => t.disconnect().await,
        }
    }

    /// Send one command and wait for its response. Fails with
    /// [`TransportError::Connection`] without any I/O when not connected.
    pub async fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        match self {
            Transport::PointToPoint(t) => t.send(command).await,
            Transport::StreamSocket(t) => t.send(command).await,
        }
    }
}
