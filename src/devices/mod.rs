//! Device façades: map domain verbs onto GPIO commands against a fixed pin

mod door;
mod energy;
mod fan;
mod light;
mod window;

pub use door::Door;
pub use energy::{EnergyMonitor, EnergyReadings, ADC_PINS};
pub use fan::Fan;
pub use light::Light;
pub use window::Window;

use crate::config::{DeviceKind, DeviceSpec};
use crate::controller::CommandSink;
use crate::error::TransportError;
use crate::parser::Action;
use crate::tools::{StatusMap, ToolHandler};
use async_trait::async_trait;
use linkbrain_protocol::{Command, Response};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failures of a device operation
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Peer rejected command: {0}")]
    Rejected(String),

    #[error("Invalid pin {pin}: {reason}")]
    InvalidPin { pin: u8, reason: String },

    #[error("Unexpected reply: {0}")]
    BadReply(String),

    #[error("Action '{0}' not supported")]
    Unsupported(Action),
}

const SWITCH_ACTIONS: &[Action] = &[Action::On, Action::Off, Action::Status];

fn expect_success(response: Response) -> Result<Response, DeviceError> {
    if response.success {
        Ok(response)
    } else {
        Err(DeviceError::Rejected(
            response.error.unwrap_or_else(|| "Unknown error".into()),
        ))
    }
}

/// Drive `pin` to `value`
async fn set_pin(sink: &dyn CommandSink, pin: u8, value: u8) -> Result<(), DeviceError> {
    let response = sink.send_command(Command::gpio_set(pin, value)).await?;
    expect_success(response)?;
    Ok(())
}

/// Read the raw value of `pin`
async fn read_pin(sink: &dyn CommandSink, pin: u8) -> Result<u16, DeviceError> {
    let response = expect_success(sink.send_command(Command::gpio_get(pin)).await?)?;
    let raw = response
        .data
        .get("value")
        .ok_or_else(|| DeviceError::BadReply("missing 'value'".into()))?;
    raw.trim()
        .parse()
        .map_err(|_| DeviceError::BadReply(format!("non-numeric value '{}'", raw)))
}

fn status_map(value: Value) -> StatusMap {
    match value {
        Value::Object(map) => map,
        _ => StatusMap::new(),
    }
}

/// The closed set of device façades
pub enum Device {
    Light(Light),
    Fan(Fan),
    Door(Door),
    Window(Window),
    EnergyMonitor(EnergyMonitor),
}

impl Device {
    /// Build the façade described by a wiring entry
    pub fn from_spec(spec: &DeviceSpec, sink: Arc<dyn CommandSink>) -> Result<Self, DeviceError> {
        let name = spec.name.clone();
        Ok(match spec.kind {
            DeviceKind::Light => Device::Light(Light::new(name, spec.pin, sink)),
            DeviceKind::Fan => Device::Fan(Fan::new(name, spec.pin, sink)),
            DeviceKind::Door => Device::Door(Door::new(name, spec.pin, sink)),
            DeviceKind::Window => Device::Window(Window::new(name, spec.pin, sink)),
            DeviceKind::EnergyMonitor => {
                let mut monitor = EnergyMonitor::new(name, spec.pin, sink)?;
                if let Some(voltage) = spec.voltage {
                    monitor = monitor.with_voltage(voltage);
                }
                if let Some(factor) = spec.calibration_factor {
                    monitor = monitor.with_calibration(factor);
                }
                Device::EnergyMonitor(monitor)
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Device::Light(d) => d.name(),
            Device::Fan(d) => d.name(),
            Device::Door(d) => d.name(),
            Device::Window(d) => d.name(),
            Device::EnergyMonitor(d) => d.name(),
        }
    }

    /// One-time pin setup after the controller is connected
    pub async fn init(&self) {
        if let Device::EnergyMonitor(monitor) = self {
            monitor.init().await;
        }
    }
}

#[async_trait]
impl ToolHandler for Device {
    fn supported_actions(&self) -> &'static [Action] {
        match self {
            Device::EnergyMonitor(_) => &[Action::Status],
            _ => SWITCH_ACTIONS,
        }
    }

    async fn on(&self) -> Result<(), DeviceError> {
        match self {
            Device::Light(d) => d.on().await,
            Device::Fan(d) => d.on().await,
            Device::Door(d) => d.unlock().await,
            Device::Window(d) => d.open().await,
            Device::EnergyMonitor(_) => Err(DeviceError::Unsupported(Action::On)),
        }
    }

    async fn off(&self) -> Result<(), DeviceError> {
        match self {
            Device::Light(d) => d.off().await,
            Device::Fan(d) => d.off().await,
            Device::Door(d) => d.lock().await,
            Device::Window(d) => d.close().await,
            Device::EnergyMonitor(_) => Err(DeviceError::Unsupported(Action::Off)),
        }
    }

    async fn status(&self) -> Result<StatusMap, DeviceError> {
        Ok(match self {
            Device::Light(d) => d.status().await,
            Device::Fan(d) => d.status().await,
            Device::Door(d) => d.status(),
            Device::Window(d) => d.status().await,
            Device::EnergyMonitor(d) => d.status().await,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Command sink that records wire strings and plays back scripted replies
    /// (plain `OK` once the script runs out)
    #[derive(Default)]
    pub struct ScriptedSink {
        replies: Mutex<VecDeque<Result<Response, TransportError>>>,
        pub sent: Mutex<Vec<String>>,
    }

    impl ScriptedSink {
        pub fn with_replies(replies: Vec<Result<Response, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for ScriptedSink {
        async fn send_command(&self, command: Command) -> Result<Response, TransportError> {
            self.sent.lock().unwrap().push(command.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Response::ok(Default::default())))
        }
    }

    pub fn reply(raw: &str) -> Result<Response, TransportError> {
        Ok(linkbrain_protocol::decode_response(raw))
    }
}
