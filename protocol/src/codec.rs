//! Textual codec for the command protocol
//!
//! ```text
//! Request:  <kind>[:<key>=<value>[,<key>=<value>...]]
//! Response: OK[:<key>=<value>[,<key>=<value>...]]
//!         | ERROR[:<message>]
//! ```
//!
//! No escaping is performed. Stream transports terminate each record with a
//! single `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use thiserror::Error;

use crate::limits::RECORD_DELIMITER;
use crate::{Command, CommandKind, Response};

/// Errors that can occur while decoding a request record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command kind: {0}")]
    UnknownKind(String),

    #[error("Malformed parameter: {0}")]
    MalformedParam(String),
}

/// Encode a command into its wire string
pub fn encode(command: &Command) -> String {
    let kind = command.kind.as_str();
    if command.params().is_empty() {
        return kind.to_string();
    }

    let params = command
        .params()
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");

    format!("{}:{}", kind, params)
}

/// Encode a command as a delimited record for stream transports
pub fn encode_record(command: &Command) -> Bytes {
    let wire = encode(command);
    let mut buf = BytesMut::with_capacity(wire.len() + 1);
    buf.put_slice(wire.as_bytes());
    buf.put_u8(RECORD_DELIMITER);
    buf.freeze()
}

/// Decode a peer reply into a [`Response`].
///
/// Total: every input maps to some response, never an error. A failure
/// always carries a non-empty message; `ERROR` and `ERROR:` both decode to
/// "Unknown error".
pub fn decode_response(raw: &str) -> Response {
    if raw.starts_with("OK") {
        let mut data = HashMap::new();
        if let Some((_, body)) = raw.split_once(':') {
            for pair in body.split(',') {
                if let Some((key, value)) = pair.split_once('=') {
                    data.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        return Response::ok(data);
    }

    if raw.starts_with("ERROR") {
        let message = match raw.split_once(':') {
            Some((_, msg)) if !msg.is_empty() => msg.to_string(),
            _ => "Unknown error".to_string(),
        };
        return Response::error(message);
    }

    Response::error(format!("Invalid response format: {}", raw))
}

/// Decode a request record into a [`Command`] (peer side)
pub fn decode_command(raw: &str) -> Result<Command, CodecError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }

    let (kind, body) = match raw.split_once(':') {
        Some((kind, body)) => (kind, Some(body)),
        None => (raw, None),
    };

    let mut command = Command::new(kind.parse::<CommandKind>()?);
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        for pair in body.split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CodecError::MalformedParam(pair.to_string()))?;
            if key.is_empty() {
                return Err(CodecError::MalformedParam(pair.to_string()));
            }
            command = command.with_param(key, value);
        }
    }

    Ok(command)
}

/// Accumulates stream bytes and yields complete delimited records
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: BytesMut,
}

impl RecordDecoder {
    /// Create a new record decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete record, without its delimiter.
    ///
    /// Call repeatedly until it returns `None` to drain the buffer.
    pub fn next_record(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == RECORD_DELIMITER)?;
        let line = self.buffer.split_to(pos + 1);
        let text = String::from_utf8_lossy(&line[..pos]);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Bytes held that do not yet form a complete record
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
