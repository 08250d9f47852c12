//! Trait abstraction over the GATT peer, so the acknowledgement logic can run
//! against BlueZ or an in-process double

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Properties of the peer's response characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseChannel {
    pub read: bool,
    pub notify: bool,
}

/// Notification payloads as delivered by the peer
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// A connected GATT peer exposing a command characteristic and, optionally,
/// a response characteristic
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Inspect the response characteristic; `None` when the peer exposes none
    async fn response_channel(&self) -> Result<Option<ResponseChannel>, TransportError>;

    /// Write one encoded command
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Read the response characteristic once
    async fn read(&self) -> Result<Vec<u8>, TransportError>;

    /// Subscribe to response notifications
    async fn subscribe(&self) -> Result<NotificationStream, TransportError>;

    /// Tear down the link
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Factory for GATT links (discovery + connect)
#[async_trait]
pub trait PeripheralConnector: Send + Sync {
    /// The link type this connector produces
    type Link: GattLink;

    /// Discover the peer and connect, returning a link on success
    async fn connect(&self) -> Result<Self::Link, TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
