//! Controller: selects a transport from configuration and serialises access
//! to it

use crate::config::{ControllerConfig, TransportMode};
use crate::error::{ConfigError, TransportError};
use crate::transport::{BleTransport, SessionState, TcpTransport, Transport};
use async_trait::async_trait;
use linkbrain_protocol::{Command, Response};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Anything that can carry a command to the peer and return its response
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, command: Command) -> Result<Response, TransportError>;
}

/// Single entry point for peer communication.
///
/// The transport sits behind a mutex held for the whole write-then-await
/// exchange, so concurrent callers are served one command at a time and
/// responses arrive in send order.
pub struct Controller {
    mode: TransportMode,
    transport: Mutex<Transport>,
}

impl Controller {
    /// Build the transport selected by `config.mode`
    pub fn new(config: ControllerConfig) -> Result<Self, ConfigError> {
        let transport = match config.mode {
            TransportMode::PointToPoint => {
                Transport::PointToPoint(BleTransport::bluer(config.ble_config()?))
            }
            TransportMode::StreamSocket => {
                Transport::StreamSocket(TcpTransport::new(config.tcp_config()?))
            }
        };

        info!("Controller initialized with {} mode", config.mode);
        Ok(Self::with_transport(config.mode, transport))
    }

    /// Wrap an already constructed transport
    pub fn with_transport(mode: TransportMode, transport: Transport) -> Self {
        Self {
            mode,
            transport: Mutex::new(transport),
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut transport = self.transport.lock().await;
        info!("Connecting via {}", transport.name());
        transport.connect().await?;
        info!("Successfully connected via {}", transport.name());
        Ok(())
    }

    /// Always attempted; never fails
    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        info!("Disconnecting from peer");
        transport.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    pub async fn state(&self) -> SessionState {
        self.transport.lock().await.state()
    }

    /// Send a command; transport failures propagate unchanged
    pub async fn send(&self, command: &Command) -> Result<Response, TransportError> {
        let mut transport = self.transport.lock().await;
        debug!("Sending command: {}", command);
        match transport.send(command).await {
            Ok(response) => {
                debug!("Received response: {:?}", response);
                Ok(response)
            }
            Err(e) => {
                error!("Command {} failed: {}", command.kind, e);
                Err(e)
            }
        }
    }

    /// Query peer status. Never fails: errors are folded into
    /// `{status: "error", message}`.
    pub async fn status(&self) -> HashMap<String, String> {
        let failure = |message: String| {
            HashMap::from([
                ("status".to_string(), "error".to_string()),
                ("message".to_string(), message),
            ])
        };

        match self.send(&Command::status()).await {
            Ok(response) if response.success => response.data,
            Ok(response) => failure(response.error.unwrap_or_else(|| "Unknown error".into())),
            Err(e) => failure(e.to_string()),
        }
    }
}

#[async_trait]
impl CommandSink for Controller {
    async fn send_command(&self, command: Command) -> Result<Response, TransportError> {
        self.send(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    /// Loopback peer answering each request line with the next scripted reply
    async fn scripted_peer(replies: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            }
        });
        port
    }

    fn tcp_config(port: u16) -> ControllerConfig {
        ControllerConfig {
            mode: TransportMode::StreamSocket,
            address: Some("127.0.0.1".into()),
            port,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_stream_socket_requires_address() {
        let config = ControllerConfig {
            mode: TransportMode::StreamSocket,
            ..Default::default()
        };
        assert!(matches!(
            Controller::new(config),
            Err(ConfigError::MissingAddress(_))
        ));
    }

    #[test]
    fn test_unknown_mode_rejected_before_construction() {
        assert!(matches!(
            "carrier-pigeon".parse::<TransportMode>(),
            Err(ConfigError::UnsupportedMode(_))
        ));
    }

    #[tokio::test]
    async fn test_send_and_status_over_stream_socket() {
        let port = scripted_peer(vec!["OK:pin=5,value=0\n", "OK:uptime=42,heap=1000\n"]).await;
        let controller = Controller::new(tcp_config(port)).unwrap();
        assert!(!controller.is_connected().await);

        controller.connect().await.unwrap();
        assert!(controller.is_connected().await);

        let resp = controller.send(&Command::gpio_get(5)).await.unwrap();
        assert_eq!(resp.data.get("value").map(String::as_str), Some("0"));

        let status = controller.status().await;
        assert_eq!(status.get("uptime").map(String::as_str), Some("42"));
        assert_eq!(status.get("heap").map(String::as_str), Some("1000"));

        controller.disconnect().await;
        assert!(!controller.is_connected().await);
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_serialized() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut seen = Vec::new();
            for _ in 0..3 {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();

                // Nothing else may arrive until this request is answered
                let mut peek_buf = [0u8; 1];
                let early = !reader.buffer().is_empty()
                    || timeout(Duration::from_millis(50), reader.get_mut().peek(&mut peek_buf))
                        .await
                        .is_ok();
                assert!(!early, "request arrived before reply to {}", line.trim());

                let pin = line.trim().strip_prefix("gpio_get:pin=").unwrap().to_string();
                reader
                    .get_mut()
                    .write_all(format!("OK:pin={}\n", pin).as_bytes())
                    .await
                    .unwrap();
                seen.push(pin);
            }
            seen
        });

        let controller = Controller::new(tcp_config(port)).unwrap();
        controller.connect().await.unwrap();

        let (cmd1, cmd2, cmd3) = (
            Command::gpio_get(1),
            Command::gpio_get(2),
            Command::gpio_get(3),
        );
        let (one, two, three) = tokio::join!(
            controller.send(&cmd1),
            controller.send(&cmd2),
            controller.send(&cmd3),
        );
        for (resp, pin) in [(one, "1"), (two, "2"), (three, "3")] {
            assert_eq!(resp.unwrap().data.get("pin").map(String::as_str), Some(pin));
        }

        let mut seen = peer.await.unwrap();
        seen.sort();
        assert_eq!(seen, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_status_folds_peer_error() {
        let port = scripted_peer(vec!["ERROR:busy\n"]).await;
        let controller = Controller::new(tcp_config(port)).unwrap();
        controller.connect().await.unwrap();

        let status = controller.status().await;
        assert_eq!(status.get("status").map(String::as_str), Some("error"));
        assert_eq!(status.get("message").map(String::as_str), Some("busy"));
    }

    #[tokio::test]
    async fn test_status_when_disconnected_does_not_fail() {
        let controller = Controller::new(tcp_config(1)).unwrap();

        let status = controller.status().await;
        assert_eq!(status.get("status").map(String::as_str), Some("error"));
        assert!(status["message"].contains("Not connected"));

        let err = controller.send(&Command::status()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
