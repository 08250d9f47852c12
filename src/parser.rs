//! Parser for turning generator output into device actions

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Message used when the batch carries none
pub const DEFAULT_MESSAGE: &str = "Actions parsed successfully";

/// Batch-level parse failures; nothing in the batch may be executed
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON in generator output: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Response is not a JSON object")]
    NotAnObject,

    #[error("Missing 'actions' field in response")]
    MissingActions,

    #[error("'actions' field is not an array")]
    ActionsNotArray,
}

/// Whitelisted action verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            "status" => Ok(Action::Status),
            other => Err(other.to_string()),
        }
    }
}

/// A (device, verb) pair extracted from generator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAction {
    pub device: String,
    pub action: Action,
}

impl DeviceAction {
    pub fn new(device: impl Into<String>, action: Action) -> Self {
        Self {
            device: device.into(),
            action,
        }
    }
}

/// Parsed generator output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub actions: Vec<DeviceAction>,
    pub message: String,
    pub raw_text: String,
}

/// Parses free-form generator output into a [`ParsedBatch`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionParser;

impl ActionParser {
    pub fn new() -> Self {
        Self
    }

    /// Candidate JSON text: fences removed, then the outermost `{...}` span,
    /// or the stripped text when there is none
    pub fn extract_json(text: &str) -> &str {
        let stripped = strip_fences(text);
        match (stripped.find('{'), stripped.rfind('}')) {
            (Some(start), Some(end)) if start < end => &stripped[start..=end],
            _ => stripped,
        }
    }

    /// Parse generator output.
    ///
    /// The envelope is all-or-nothing; individual malformed actions are
    /// skipped and logged.
    pub fn parse(&self, text: &str) -> Result<ParsedBatch, ParseError> {
        debug!("Parsing generator output: {:.100}", text);

        let value: Value = serde_json::from_str(Self::extract_json(text))?;
        let envelope = value.as_object().ok_or(ParseError::NotAnObject)?;
        let items = envelope
            .get("actions")
            .ok_or(ParseError::MissingActions)?
            .as_array()
            .ok_or(ParseError::ActionsNotArray)?;

        let actions: Vec<DeviceAction> = items.iter().filter_map(parse_action).collect();

        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MESSAGE)
            .to_string();

        info!("Parsed {} actions from generator output", actions.len());
        Ok(ParsedBatch {
            actions,
            message,
            raw_text: text.to_string(),
        })
    }
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the opening fence and its info string (e.g. "json")
        s = rest.split_once('\n').map_or(rest, |(_, body)| body);
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn parse_action(item: &Value) -> Option<DeviceAction> {
    let Some(obj) = item.as_object() else {
        warn!("Skipping invalid action: {}", item);
        return None;
    };

    let device = obj.get("device").and_then(Value::as_str).unwrap_or("").trim();
    if device.is_empty() {
        warn!("Skipping action with no device name");
        return None;
    }

    let raw_action = obj.get("action").and_then(Value::as_str).unwrap_or("");
    match raw_action.parse::<Action>() {
        Ok(action) => Some(DeviceAction::new(device, action)),
        Err(invalid) => {
            warn!("Invalid action '{}' for {}, skipping", invalid, device);
            None
        }
    }
}
