use super::{read_pin, set_pin, status_map, DeviceError};
use crate::controller::CommandSink;
use crate::tools::StatusMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Light on a relay pin
pub struct Light {
    name: String,
    pin: u8,
    sink: Arc<dyn CommandSink>,
    powered: AtomicBool,
}

impl Light {
    pub fn new(name: impl Into<String>, pin: u8, sink: Arc<dyn CommandSink>) -> Self {
        let name = name.into();
        info!("Device '{}' initialized", name);
        Self {
            name,
            pin,
            sink,
            powered: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn on(&self) -> Result<(), DeviceError> {
        info!("Turning on light '{}' (pin {})", self.name, self.pin);
        set_pin(self.sink.as_ref(), self.pin, 1).await?;
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn off(&self) -> Result<(), DeviceError> {
        info!("Turning off light '{}' (pin {})", self.name, self.pin);
        set_pin(self.sink.as_ref(), self.pin, 0).await?;
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Refresh from the pin; falls back to the cached state if the read fails
    pub async fn status(&self) -> StatusMap {
        match read_pin(self.sink.as_ref(), self.pin).await {
            Ok(value) => self.powered.store(value == 1, Ordering::SeqCst),
            Err(e) => error!("Failed to get light status: {}", e),
        }
        let power = if self.powered.load(Ordering::SeqCst) { "on" } else { "off" };
        status_map(json!({ "power": power, "pin": self.pin }))
    }
}
