//! BLE GATT transport with per-session acknowledgement mode detection

use crate::config::BleConfig;
use crate::error::TransportError;
use crate::transport::ble_discovery::BleDiscovery;
use crate::transport::traits::{
    GattLink, NotificationStream, PeripheralConnector, ResponseChannel,
};
use crate::transport::{AckMode, SessionState};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::Device;
use futures::StreamExt;
use linkbrain_protocol::{decode_response, encode, limits, Command, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

impl AckMode {
    /// Pick the acknowledgement mode for a response channel, in priority
    /// order notify > read > none
    pub fn detect(channel: Option<ResponseChannel>) -> AckMode {
        match channel {
            Some(ch) if ch.notify => AckMode::Notify,
            Some(ch) if ch.read => AckMode::PollableRead,
            _ => AckMode::FireAndForget,
        }
    }
}

/// GATT link backed by BlueZ
pub struct BluerLink {
    device: Device,
    write_char: Characteristic,
    response_char: Option<Characteristic>,
}

#[async_trait]
impl GattLink for BluerLink {
    async fn response_channel(&self) -> Result<Option<ResponseChannel>, TransportError> {
        let Some(ch) = &self.response_char else {
            return Ok(None);
        };
        let flags = ch.flags().await.map_err(command_error)?;
        Ok(Some(ResponseChannel {
            read: flags.read,
            notify: flags.notify,
        }))
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.write_char.write(payload).await.map_err(command_error)
    }

    async fn read(&self) -> Result<Vec<u8>, TransportError> {
        match &self.response_char {
            Some(ch) => ch.read().await.map_err(command_error),
            None => Err(TransportError::Command("No response characteristic".into())),
        }
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        match &self.response_char {
            Some(ch) => Ok(ch.notify().await.map_err(command_error)?.boxed()),
            None => Err(TransportError::Command("No response characteristic".into())),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.device.disconnect().await.map_err(command_error)
    }
}

/// Connector that discovers the peer through BlueZ and opens a GATT link
pub struct BluerConnector {
    config: BleConfig,
}

impl BluerConnector {
    pub fn new(config: BleConfig) -> Self {
        Self { config }
    }

    async fn locate_characteristics(
        &self,
        device: &Device,
    ) -> Result<(Characteristic, Option<Characteristic>), TransportError> {
        let mut write_char = None;
        let mut response_char = None;

        for service in device.services().await.map_err(connection_error)? {
            for ch in service.characteristics().await.map_err(connection_error)? {
                let uuid = ch.uuid().await.map_err(connection_error)?;
                if uuid == self.config.write_char_uuid {
                    write_char = Some(ch);
                } else if uuid == self.config.response_char_uuid {
                    response_char = Some(ch);
                }
            }
        }

        let write_char = write_char.ok_or_else(|| {
            TransportError::Connection(format!(
                "Peer has no command characteristic {}",
                self.config.write_char_uuid
            ))
        })?;
        Ok((write_char, response_char))
    }
}

#[async_trait]
impl PeripheralConnector for BluerConnector {
    type Link = BluerLink;

    async fn connect(&self) -> Result<Self::Link, TransportError> {
        let adapter = BleDiscovery::get_adapter().await?;
        let discovery = BleDiscovery::new(self.config.clone());
        let device = discovery.find_peer(&adapter).await?;

        info!("[BLE] Connecting to {}", device.address());
        connect_within(
            self.config.connect_timeout,
            async { device.connect().await.map_err(connection_error) },
            async {
                if let Err(e) = device.disconnect().await {
                    debug!("[BLE] Disconnect after timeout failed: {}", e);
                }
            },
        )
        .await?;

        let (write_char, response_char) = match self.locate_characteristics(&device).await {
            Ok(chars) => chars,
            Err(e) => {
                let _ = device.disconnect().await;
                return Err(e);
            }
        };

        Ok(BluerLink {
            device,
            write_char,
            response_char,
        })
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}

/// Run `connect` within `bound`. On timeout `abort` runs before the error is
/// returned, so the stack does not keep a connect attempt pending.
async fn connect_within<F, A>(bound: Duration, connect: F, abort: A) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
    A: Future<Output = ()>,
{
    match timeout(bound, connect).await {
        Ok(result) => result,
        Err(_) => {
            abort.await;
            Err(TransportError::Connection(format!(
                "BLE connect timed out after {:?}",
                bound
            )))
        }
    }
}

/// State of a live BLE session
struct BleSession<L> {
    link: L,
    mode: AckMode,
    latest: Arc<Mutex<Option<String>>>,
    forwarder: Option<JoinHandle<()>>,
}

impl<L: GattLink> BleSession<L> {
    async fn exchange(&self, command: &Command) -> Result<String, TransportError> {
        let payload = encode(command);
        debug!("[BLE] Sending: {} ({:?})", payload, self.mode);

        match self.mode {
            AckMode::FireAndForget => {
                self.write(payload.as_bytes(), command.timeout).await?;
                Ok("OK".into())
            }
            AckMode::PollableRead => {
                self.write(payload.as_bytes(), command.timeout).await?;
                let data = timeout(command.timeout, self.link.read())
                    .await
                    .map_err(|_| TransportError::Timeout(command.timeout))??;
                Ok(String::from_utf8_lossy(&data).into_owned())
            }
            AckMode::Notify => {
                // Cleared before the write so a fast reply is not lost
                self.latest.lock().await.take();
                self.write(payload.as_bytes(), command.timeout).await?;
                Ok(self.await_notification(command.timeout).await)
            }
            AckMode::Response => Err(TransportError::Command(
                "Response mode is not available over BLE".into(),
            )),
        }
    }

    async fn write(&self, payload: &[u8], bound: Duration) -> Result<(), TransportError> {
        timeout(bound, self.link.write(payload))
            .await
            .map_err(|_| TransportError::Timeout(bound))?
    }

    /// Poll the latest-notification slot until data arrives or the deadline
    /// passes. Silence is treated as success: peers do not always echo.
    async fn await_notification(&self, wait: Duration) -> String {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(data) = self.latest.lock().await.take() {
                return data;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("[BLE] No notification within {:?}, assuming success", wait);
                return "OK".into();
            }
            sleep(limits::NOTIFY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

fn spawn_forwarder(
    mut stream: NotificationStream,
    latest: Arc<Mutex<Option<String>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(data) = stream.next().await {
            let text = String::from_utf8_lossy(&data).into_owned();
            debug!("[BLE] Notification: {}", text);
            *latest.lock().await = Some(text);
        }
        debug!("[BLE] Notification stream ended");
    })
}

/// Point-to-point transport over a GATT link.
///
/// Not reentrant: one command is in flight at a time, enforced by `&mut self`.
pub struct BleTransport<C: PeripheralConnector = BluerConnector> {
    connector: C,
    session: Option<BleSession<C::Link>>,
    state: SessionState,
}

impl BleTransport<BluerConnector> {
    /// Transport that discovers and connects through BlueZ
    pub fn bluer(config: BleConfig) -> Self {
        Self::new(BluerConnector::new(config))
    }
}

impl<C: PeripheralConnector> BleTransport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn name(&self) -> &'static str {
        self.connector.name()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Detected acknowledgement mode of the live session
    pub fn ack_mode(&self) -> Option<AckMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Discover, connect and detect the acknowledgement mode once for the
    /// session
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }

        info!("[BLE] Attempting to connect via {}...", self.connector.name());
        self.state = SessionState::Connecting;

        let link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        let channel = match link.response_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("[BLE] Error detecting response channel: {}", e);
                None
            }
        };
        info!(
            "[BLE] Response channel: read={} notify={}",
            channel.map_or(false, |c| c.read),
            channel.map_or(false, |c| c.notify)
        );

        let latest = Arc::new(Mutex::new(None));
        let mut forwarder = None;
        let mut mode = AckMode::detect(channel);

        if mode == AckMode::Notify {
            match link.subscribe().await {
                Ok(stream) => forwarder = Some(spawn_forwarder(stream, latest.clone())),
                Err(e) => {
                    warn!("[BLE] Subscribe failed, not using notifications: {}", e);
                    mode = AckMode::detect(channel.map(|c| ResponseChannel {
                        notify: false,
                        ..c
                    }));
                }
            }
        }

        info!("[BLE] Connected ({:?} mode)", mode);
        self.session = Some(BleSession {
            link,
            mode,
            latest,
            forwarder,
        });
        self.state = SessionState::Connected(mode);
        Ok(())
    }

    /// Close the session; errors are logged, never returned
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            self.state = SessionState::Disconnected;
            return;
        };

        if let Some(task) = session.forwarder {
            task.abort();
        }
        if let Err(e) = session.link.disconnect().await {
            warn!("[BLE] Error during disconnect: {}", e);
        }
        self.state = SessionState::Disconnected;
        info!("[BLE] Disconnected");
    }

    /// Write a command and collect the reply according to the session's
    /// acknowledgement mode
    pub async fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(TransportError::not_connected)?;

        let raw = session.exchange(command).await?;
        debug!("[BLE] Received: {}", raw.trim());
        Ok(decode_response(raw.trim()))
    }
}

fn connection_error(e: bluer::Error) -> TransportError {
    TransportError::Connection(e.to_string())
}

fn command_error(e: bluer::Error) -> TransportError {
    TransportError::Command(e.to_string())
}
