use super::{read_pin, set_pin, status_map, DeviceError};
use crate::controller::CommandSink;
use crate::tools::StatusMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Window, blind or shutter actuator; pin high is open
pub struct Window {
    name: String,
    pin: u8,
    sink: Arc<dyn CommandSink>,
    open: AtomicBool,
}

impl Window {
    pub fn new(name: impl Into<String>, pin: u8, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            name: name.into(),
            pin,
            sink,
            open: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn open(&self) -> Result<(), DeviceError> {
        info!("Opening {}", self.name);
        set_pin(self.sink.as_ref(), self.pin, 1).await?;
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) -> Result<(), DeviceError> {
        info!("Closing {}", self.name);
        set_pin(self.sink.as_ref(), self.pin, 0).await?;
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn toggle(&self) -> Result<(), DeviceError> {
        if self.open.load(Ordering::SeqCst) {
            self.close().await
        } else {
            self.open().await
        }
    }

    pub async fn status(&self) -> StatusMap {
        match read_pin(self.sink.as_ref(), self.pin).await {
            Ok(value) => self.open.store(value != 0, Ordering::SeqCst),
            Err(e) => warn!("Could not read pin status: {}", e),
        }
        let state = if self.open.load(Ordering::SeqCst) { "open" } else { "closed" };
        status_map(json!({
            "name": self.name,
            "pin": self.pin,
            "state": state,
            "type": "window",
        }))
    }
}
