//! TCP stream-socket transport (one newline-terminated record per command)

use crate::config::TcpConfig;
use crate::error::TransportError;
use crate::transport::{AckMode, SessionState};
use linkbrain_protocol::{codec::encode_record, decode_response, Command, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Stream-socket transport; always expects a response record
pub struct TcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "WiFi"
    }

    pub fn state(&self) -> SessionState {
        match self.stream {
            Some(_) => SessionState::Connected(AckMode::Response),
            None => SessionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the stream, bounded by the configured connect timeout
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("[TCP] Connecting to {}", addr);

        match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("[TCP] Could not set TCP_NODELAY: {}", e);
                }
                self.stream = Some(stream);
                info!("[TCP] Connected to {}", addr);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Connection(format!(
                "Failed to connect to {}: {}",
                addr, e
            ))),
            Err(_) => Err(TransportError::Connection(format!(
                "Connection to {} timed out after {:?}",
                addr, self.config.connect_timeout
            ))),
        }
    }

    /// Close the stream; errors are logged, never returned
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!("[TCP] Error during disconnect: {}", e);
            }
            info!("[TCP] Disconnected");
        }
    }

    /// Write the command record, then perform one bounded read for the reply.
    ///
    /// A zero-length read means the peer closed the stream; it is reported as
    /// a command failure and no reconnect is attempted. Bytes already waiting
    /// before the write belong to an earlier, timed-out command and are
    /// discarded.
    pub async fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(TransportError::not_connected)?;

        let mut buf = vec![0u8; self.config.read_buffer_size];
        discard_stale(stream, &mut buf)?;

        let record = encode_record(command);
        debug!("[TCP] Sending: {}", String::from_utf8_lossy(&record).trim_end());

        timeout(command.timeout, stream.write_all(&record))
            .await
            .map_err(|_| TransportError::Timeout(command.timeout))?
            .map_err(|e| TransportError::Command(format!("Socket error: {}", e)))?;

        let n = match timeout(command.timeout, stream.read(&mut buf)).await {
            Err(_) => return Err(TransportError::Timeout(command.timeout)),
            Ok(Err(e)) => {
                return Err(TransportError::Command(format!(
                    "Failed to receive response: {}",
                    e
                )))
            }
            Ok(Ok(0)) => {
                return Err(TransportError::Command("Connection closed by peer".into()));
            }
            Ok(Ok(n)) => n,
        };

        let raw = String::from_utf8_lossy(&buf[..n]);
        debug!("[TCP] Received: {}", raw.trim());
        Ok(decode_response(raw.trim()))
    }
}

/// Drop any late reply left in the socket without waiting for more
fn discard_stale(stream: &TcpStream, buf: &mut [u8]) -> Result<(), TransportError> {
    loop {
        match stream.try_read(buf) {
            Ok(0) => return Err(TransportError::Command("Connection closed by peer".into())),
            Ok(n) => warn!(
                "[TCP] Discarding stale reply: {}",
                String::from_utf8_lossy(&buf[..n]).trim()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => {
                return Err(TransportError::Command(format!("Socket error: {}", e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, TcpConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = TcpConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        (listener, config)
    }

    #[tokio::test]
    async fn test_request_response_exchange() {
        let (listener, config) = listener().await;
        let peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            reader
                .get_mut()
                .write_all(b"OK:pin=4,value=1\n")
                .await
                .unwrap();
            line
        });

        let mut transport = TcpTransport::new(config);
        transport.connect().await.unwrap();
        assert_eq!(transport.state(), SessionState::Connected(AckMode::Response));

        let resp = transport.send(&Command::gpio_get(4)).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.get("pin").map(String::as_str), Some("4"));
        assert_eq!(resp.data.get("value").map(String::as_str), Some("1"));

        assert_eq!(peer.await.unwrap(), "gpio_get:pin=4\n");
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_peer_close_is_command_failure() {
        let (listener, config) = listener().await;
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut transport = TcpTransport::new(config);
        transport.connect().await.unwrap();

        let err = transport.send(&Command::status()).await.unwrap_err();
        assert!(matches!(err, TransportError::Command(_)));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_and_stays_connected() {
        let (listener, config) = listener().await;
        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            let _ = hold_rx.await;
        });

        let mut transport = TcpTransport::new(config);
        transport.connect().await.unwrap();

        let wait = Duration::from_millis(200);
        let err = transport
            .send(&Command::status().with_timeout(wait))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(wait));
        assert!(transport.is_connected());
        let _ = hold_tx.send(());
    }

    #[tokio::test]
    async fn test_late_reply_is_not_paired_with_next_command() {
        let (listener, config) = listener().await;
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            reader.get_mut().write_all(b"OK:pin=1,value=1\n").await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "gpio_get:pin=2\n");
            reader.get_mut().write_all(b"OK:pin=2,value=0\n").await.unwrap();
        });

        let mut transport = TcpTransport::new(config);
        transport.connect().await.unwrap();

        let wait = Duration::from_millis(50);
        let err = transport
            .send(&Command::gpio_get(1).with_timeout(wait))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(wait));

        // Let the late reply land in the socket buffer
        tokio::time::sleep(Duration::from_millis(250)).await;

        let resp = transport.send(&Command::gpio_get(2)).await.unwrap();
        assert_eq!(resp.data.get("pin").map(String::as_str), Some("2"));
        assert_eq!(resp.data.get("value").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listener().await;
        drop(listener);

        let mut transport = TcpTransport::new(config);
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
        assert_eq!(transport.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        let err = transport.send(&Command::status()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
