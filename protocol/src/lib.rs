//! LinkBrain Shared Protocol Types
//!
//! This crate provides the command/response types and the textual codec used
//! between a controlling host and an embedded peer, over any transport.

pub mod codec;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use codec::{decode_command, decode_response, encode, CodecError, RecordDecoder};

/// Protocol parameters shared by both ends of a link
pub mod limits {
    use std::time::Duration;

    /// Record terminator appended by stream transports
    pub const RECORD_DELIMITER: u8 = b'\n';

    /// Size of the single bounded read a stream transport performs per response
    pub const MAX_RESPONSE_SIZE: usize = 4096;

    /// Timeout applied to commands that do not set their own
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

    /// Poll interval for the latest-notification slot
    pub const NOTIFY_POLL_INTERVAL: Duration = Duration::from_millis(100);
}

/// The closed set of instructions a peer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    GpioSet,
    GpioGet,
    GpioMode,
    Status,
    Reset,
}

impl CommandKind {
    /// Wire token for this kind (case-sensitive)
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::GpioSet => "gpio_set",
            CommandKind::GpioGet => "gpio_get",
            CommandKind::GpioMode => "gpio_mode",
            CommandKind::Status => "status",
            CommandKind::Reset => "reset",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpio_set" => Ok(CommandKind::GpioSet),
            "gpio_get" => Ok(CommandKind::GpioGet),
            "gpio_mode" => Ok(CommandKind::GpioMode),
            "status" => Ok(CommandKind::Status),
            "reset" => Ok(CommandKind::Reset),
            other => Err(CodecError::UnknownKind(other.to_string())),
        }
    }
}

/// One discrete instruction sent to the peer.
///
/// Parameters keep insertion order and keys stay unique: setting an existing
/// key replaces its value in place. Values are sent verbatim, so they must
/// not contain `=` or `,`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Command {
    /// Create a command with no parameters and the default timeout
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
            timeout: limits::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Add (or replace) a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Override the per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drive a pin high (1) or low (0)
    pub fn gpio_set(pin: u8, value: u8) -> Self {
        Self::new(CommandKind::GpioSet)
            .with_param("pin", pin)
            .with_param("value", value)
    }

    /// Read a pin
    pub fn gpio_get(pin: u8) -> Self {
        Self::new(CommandKind::GpioGet).with_param("pin", pin)
    }

    /// Configure a pin mode ("input", "output", "input_pullup")
    pub fn gpio_mode(pin: u8, mode: &str) -> Self {
        Self::new(CommandKind::GpioMode)
            .with_param("pin", pin)
            .with_param("mode", mode)
    }

    pub fn status() -> Self {
        Self::new(CommandKind::Status)
    }

    pub fn reset() -> Self {
        Self::new(CommandKind::Reset)
    }

    /// Parameters in insertion order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Look up a parameter value
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Decoded outcome of a command.
///
/// `data` is meaningful only when `success` is true, `error` only when it
/// is false.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub success: bool,
    pub data: HashMap<String, String>,
    pub error: Option<String>,
}

impl Response {
    /// Successful response carrying `data`
    pub fn ok(data: HashMap<String, String>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Failed response carrying `message`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: HashMap::new(),
            error: Some(message.into()),
        }
    }

    /// Render as a reply record (peer side).
    ///
    /// Data keys are sorted so replies are stable.
    pub fn to_wire(&self) -> String {
        if !self.success {
            return match &self.error {
                Some(msg) => format!("ERROR:{}", msg),
                None => "ERROR".to_string(),
            };
        }
        if self.data.is_empty() {
            return "OK".to_string();
        }
        let mut pairs: Vec<_> = self.data.iter().collect();
        pairs.sort();
        let body = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!("OK:{}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpio_set_constructor() {
        let cmd = Command::gpio_set(12, 1);
        assert_eq!(cmd.kind, CommandKind::GpioSet);
        assert_eq!(cmd.param("pin"), Some("12"));
        assert_eq!(cmd.param("value"), Some("1"));
        assert_eq!(cmd.timeout, limits::DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_with_param_replaces_existing_key() {
        let cmd = Command::new(CommandKind::GpioSet)
            .with_param("pin", 4)
            .with_param("value", 0)
            .with_param("pin", 5);
        assert_eq!(
            cmd.params(),
            &[
                ("pin".to_string(), "5".to_string()),
                ("value".to_string(), "0".to_string())
            ]
        );
    }

    #[test]
    fn test_kind_tokens() {
        for kind in [
            CommandKind::GpioSet,
            CommandKind::GpioGet,
            CommandKind::GpioMode,
            CommandKind::Status,
            CommandKind::Reset,
        ] {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
        assert!("GPIO_SET".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_response_to_wire() {
        assert_eq!(Response::ok(HashMap::new()).to_wire(), "OK");
        assert_eq!(Response::error("bad pin").to_wire(), "ERROR:bad pin");

        let mut data = HashMap::new();
        data.insert("value".to_string(), "1".to_string());
        data.insert("pin".to_string(), "12".to_string());
        assert_eq!(Response::ok(data).to_wire(), "OK:pin=12,value=1");
    }
}
