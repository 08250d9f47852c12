//! In-memory GPIO table answering protocol commands

use linkbrain_protocol::{Command, CommandKind, Response};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tokio::time::Instant;

const PIN_MODES: &[&str] = &["input", "output", "input_pullup", "input_pulldown"];
const MAX_PIN: u8 = 39;

#[derive(Debug, Clone, Default)]
struct PinState {
    mode: Option<String>,
    value: u16,
}

/// Simulated pin state, shared by every connection
pub struct PinTable {
    pins: Mutex<BTreeMap<u8, PinState>>,
    started: Instant,
}

impl Default for PinTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PinTable {
    pub fn new() -> Self {
        Self {
            pins: Mutex::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Apply a command and build the reply
    pub async fn handle(&self, command: &Command) -> Response {
        match self.apply(command).await {
            Ok(data) => Response::ok(data),
            Err(message) => Response::error(message),
        }
    }

    async fn apply(&self, command: &Command) -> Result<HashMap<String, String>, String> {
        let mut pins = self.pins.lock().await;
        match command.kind {
            CommandKind::GpioSet => {
                let pin = pin_param(command)?;
                let value: u16 = match param(command, "value")? {
                    "0" => 0,
                    "1" => 1,
                    other => return Err(format!("invalid value '{}'", other)),
                };
                pins.entry(pin).or_default().value = value;
                Ok(pin_reply(pin, value))
            }
            CommandKind::GpioGet => {
                let pin = pin_param(command)?;
                let value = pins.get(&pin).map_or(0, |state| state.value);
                Ok(pin_reply(pin, value))
            }
            CommandKind::GpioMode => {
                let pin = pin_param(command)?;
                let mode = param(command, "mode")?;
                if !PIN_MODES.contains(&mode) {
                    return Err(format!("unsupported mode '{}'", mode));
                }
                pins.entry(pin).or_default().mode = Some(mode.to_string());
                Ok(HashMap::from([
                    ("pin".to_string(), pin.to_string()),
                    ("mode".to_string(), mode.to_string()),
                ]))
            }
            CommandKind::Status => Ok(HashMap::from([
                ("uptime".to_string(), self.started.elapsed().as_secs().to_string()),
                ("pins".to_string(), pins.len().to_string()),
                ("state".to_string(), "running".to_string()),
            ])),
            CommandKind::Reset => {
                pins.clear();
                Ok(HashMap::new())
            }
        }
    }
}

fn param<'a>(command: &'a Command, key: &str) -> Result<&'a str, String> {
    command
        .param(key)
        .ok_or_else(|| format!("missing parameter '{}'", key))
}

fn pin_param(command: &Command) -> Result<u8, String> {
    let raw = param(command, "pin")?;
    match raw.parse::<u8>() {
        Ok(pin) if pin <= MAX_PIN => Ok(pin),
        _ => Err(format!("invalid pin '{}'", raw)),
    }
}

fn pin_reply(pin: u8, value: u16) -> HashMap<String, String> {
    HashMap::from([
        ("pin".to_string(), pin.to_string()),
        ("value".to_string(), value.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let table = PinTable::new();
        assert_eq!(table.handle(&Command::gpio_set(12, 1)).await.to_wire(), "OK:pin=12,value=1");
        assert_eq!(table.handle(&Command::gpio_get(12)).await.to_wire(), "OK:pin=12,value=1");
        assert_eq!(table.handle(&Command::gpio_get(13)).await.to_wire(), "OK:pin=13,value=0");
    }

    #[tokio::test]
    async fn test_mode_validation() {
        let table = PinTable::new();
        let ok = table.handle(&Command::gpio_mode(34, "input")).await;
        assert!(ok.success);

        let bad = table.handle(&Command::gpio_mode(34, "analog")).await;
        assert_eq!(bad.error.as_deref(), Some("unsupported mode 'analog'"));
    }

    #[tokio::test]
    async fn test_bad_params_are_errors() {
        let table = PinTable::new();
        let missing = table.handle(&Command::new(CommandKind::GpioGet)).await;
        assert_eq!(missing.to_wire(), "ERROR:missing parameter 'pin'");

        let out_of_range = table.handle(&Command::gpio_set(200, 1)).await;
        assert_eq!(out_of_range.to_wire(), "ERROR:invalid pin '200'");

        let not_binary = table.handle(&Command::gpio_set(5, 2)).await;
        assert_eq!(not_binary.to_wire(), "ERROR:invalid value '2'");
    }

    #[tokio::test]
    async fn test_reset_clears_pins() {
        let table = PinTable::new();
        table.handle(&Command::gpio_set(5, 1)).await;
        assert_eq!(table.handle(&Command::status()).await.data["pins"], "1");

        assert_eq!(table.handle(&Command::reset()).await.to_wire(), "OK");
        assert_eq!(table.handle(&Command::gpio_get(5)).await.data["value"], "0");
        assert_eq!(table.handle(&Command::status()).await.data["pins"], "0");
    }
}
