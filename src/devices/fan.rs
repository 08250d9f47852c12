use super::{read_pin, set_pin, status_map, DeviceError};
use crate::controller::CommandSink;
use crate::tools::StatusMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Fan switched through a relay or transistor
pub struct Fan {
    name: String,
    pin: u8,
    sink: Arc<dyn CommandSink>,
    running: AtomicBool,
}

impl Fan {
    pub fn new(name: impl Into<String>, pin: u8, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            name: name.into(),
            pin,
            sink,
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn on(&self) -> Result<(), DeviceError> {
        info!("Turning on {}", self.name);
        set_pin(self.sink.as_ref(), self.pin, 1).await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn off(&self) -> Result<(), DeviceError> {
        info!("Turning off {}", self.name);
        set_pin(self.sink.as_ref(), self.pin, 0).await?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn toggle(&self) -> Result<(), DeviceError> {
        if self.running.load(Ordering::SeqCst) {
            self.off().await
        } else {
            self.on().await
        }
    }

    pub async fn status(&self) -> StatusMap {
        match read_pin(self.sink.as_ref(), self.pin).await {
            Ok(value) => self.running.store(value != 0, Ordering::SeqCst),
            Err(e) => warn!("Could not read pin status: {}", e),
        }
        let state = if self.running.load(Ordering::SeqCst) { "on" } else { "off" };
        status_map(json!({
            "name": self.name,
            "pin": self.pin,
            "state": state,
            "type": "fan",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::{reply, ScriptedSink};
    use serde_json::json;

    #[tokio::test]
    async fn test_toggle_alternates() {
        let sink = ScriptedSink::with_replies(vec![]);
        let fan = Fan::new("ceiling", 13, sink.clone());

        fan.toggle().await.unwrap();
        fan.toggle().await.unwrap();

        assert_eq!(sink.sent(), vec!["gpio_set:pin=13,value=1", "gpio_set:pin=13,value=0"]);
    }

    #[tokio::test]
    async fn test_status_shape() {
        let sink = ScriptedSink::with_replies(vec![reply("OK:value=1")]);
        let fan = Fan::new("ceiling", 13, sink);

        let status = serde_json::Value::Object(fan.status().await);
        assert_eq!(
            status,
            json!({"name": "ceiling", "pin": 13, "state": "on", "type": "fan"})
        );
    }

    #[tokio::test]
    async fn test_non_numeric_value_keeps_cache() {
        let sink = ScriptedSink::with_replies(vec![reply("OK:value=high")]);
        let fan = Fan::new("ceiling", 13, sink);

        assert_eq!(fan.status().await["state"], "off");
    }
}
