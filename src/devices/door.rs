use super::{set_pin, status_map, DeviceError};
use crate::controller::CommandSink;
use crate::tools::StatusMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Electric door lock; pin high releases the latch
pub struct Door {
    name: String,
    pin: u8,
    sink: Arc<dyn CommandSink>,
    locked: AtomicBool,
}

impl Door {
    pub fn new(name: impl Into<String>, pin: u8, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            name: name.into(),
            pin,
            sink,
            locked: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn lock(&self) -> Result<(), DeviceError> {
        info!("Locking door '{}'", self.name);
        set_pin(self.sink.as_ref(), self.pin, 0).await?;
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn unlock(&self) -> Result<(), DeviceError> {
        info!("Unlocking door '{}'", self.name);
        set_pin(self.sink.as_ref(), self.pin, 1).await?;
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Cached state only; the lock pin is never read back
    pub fn status(&self) -> StatusMap {
        let lock_state = if self.locked.load(Ordering::SeqCst) { "locked" } else { "unlocked" };
        status_map(json!({ "lock_state": lock_state, "pin": self.pin }))
    }
}
