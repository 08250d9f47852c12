//! Tool registry - resolves named actions to handlers and isolates failures

use super::{StatusMap, ToolHandler};
use crate::parser::{Action, DeviceAction, ParsedBatch};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of executing one action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub success: bool,
    pub device: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeRecord {
    fn completed(action: &DeviceAction, data: Option<StatusMap>) -> Self {
        Self {
            success: true,
            device: action.device.clone(),
            action: action.action,
            data,
            error: None,
        }
    }

    fn failed(action: &DeviceAction, error: String) -> Self {
        Self {
            success: false,
            device: action.device.clone(),
            action: action.action,
            data: None,
            error: Some(error),
        }
    }
}

/// Outcomes of a whole batch, in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub message: String,
    pub results: Vec<OutcomeRecord>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    fn new(message: String, results: Vec<OutcomeRecord>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            message,
            results,
            succeeded,
            failed,
        }
    }
}

/// Name -> handler mapping.
///
/// Mutated only during setup; dispatch takes `&self`.
#[derive(Default)]
pub struct ToolRegistry {
    devices: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; replaces any handler already under `name`
    pub fn register_device(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        let name = name.into();
        if self.devices.insert(name.clone(), handler).is_some() {
            info!("[REGISTRY] Replaced tool: {}", name);
        } else {
            info!("[REGISTRY] Registered tool: {}", name);
        }
    }

    /// Remove a handler, returning whether one was registered
    pub fn unregister_device(&mut self, name: &str) -> bool {
        let removed = self.devices.remove(name).is_some();
        if removed {
            info!("[REGISTRY] Unregistered tool: {}", name);
        }
        removed
    }

    pub fn get_device(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.devices.get(name).cloned()
    }

    /// Registered names with their supported actions
    pub fn list_devices(&self) -> BTreeMap<String, Vec<Action>> {
        self.devices
            .iter()
            .map(|(name, handler)| (name.clone(), handler.supported_actions().to_vec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Execute one action. Never fails: every problem becomes a failed
    /// [`OutcomeRecord`].
    pub async fn execute_action(&self, action: &DeviceAction) -> OutcomeRecord {
        let Some(handler) = self.get_device(&action.device) else {
            return OutcomeRecord::failed(action, format!("Device '{}' not found", action.device));
        };

        if !handler.supported_actions().contains(&action.action) {
            return OutcomeRecord::failed(action, format!("Action '{}' not supported", action.action));
        }

        debug!("[REGISTRY] {} -> {}", action.device, action.action);
        let invocation = async {
            match action.action {
                Action::On => handler.on().await.map(|_| None),
                Action::Off => handler.off().await.map(|_| None),
                Action::Status => handler.status().await.map(Some),
            }
        };

        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(data)) => OutcomeRecord::completed(action, data),
            Ok(Err(e)) => {
                error!("[REGISTRY] {} {} failed: {}", action.device, action.action, e);
                OutcomeRecord::failed(action, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("[REGISTRY] {} {} panicked: {}", action.device, action.action, message);
                OutcomeRecord::failed(action, message)
            }
        }
    }

    /// Execute actions strictly in input order, one outcome per action
    pub async fn execute_actions(&self, actions: &[DeviceAction]) -> Vec<OutcomeRecord> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            outcomes.push(self.execute_action(action).await);
        }
        outcomes
    }

    /// Execute a parsed batch and summarise the outcome
    pub async fn execute_batch(&self, batch: &ParsedBatch) -> BatchReport {
        let results = self.execute_actions(&batch.actions).await;
        let report = BatchReport::new(batch.message.clone(), results);
        info!(
            "[REGISTRY] Batch done: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Handler panicked: {}", s)
    } else {
        "Handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const ALL: &[Action] = &[Action::On, Action::Off, Action::Status];

    #[derive(Default)]
    struct FakeTool {
        calls: Mutex<Vec<Action>>,
        fail: bool,
        panic: bool,
    }

    impl FakeTool {
        fn record(&self, action: Action) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(action);
            if self.panic {
                panic!("relay stuck");
            }
            if self.fail {
                return Err(DeviceError::Rejected("pin busy".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ToolHandler for FakeTool {
        fn supported_actions(&self) -> &'static [Action] {
            ALL
        }

        async fn on(&self) -> Result<(), DeviceError> {
            self.record(Action::On)
        }

        async fn off(&self) -> Result<(), DeviceError> {
            self.record(Action::Off)
        }

        async fn status(&self) -> Result<StatusMap, DeviceError> {
            self.record(Action::Status)?;
            let mut map = StatusMap::new();
            map.insert("power".into(), json!("on"));
            Ok(map)
        }
    }

    struct StatusOnly;

    #[async_trait]
    impl ToolHandler for StatusOnly {
        fn supported_actions(&self) -> &'static [Action] {
            &[Action::Status]
        }

        async fn status(&self) -> Result<StatusMap, DeviceError> {
            Ok(StatusMap::new())
        }
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let registry = ToolRegistry::new();
        let outcome = registry
            .execute_action(&DeviceAction::new("garage", Action::On))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Device 'garage' not found"));
    }

    #[tokio::test]
    async fn test_unsupported_action_is_not_invoked() {
        let mut registry = ToolRegistry::new();
        registry.register_device("meter", Arc::new(StatusOnly));

        let outcome = registry
            .execute_action(&DeviceAction::new("meter", Action::Off))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn test_status_carries_data() {
        let mut registry = ToolRegistry::new();
        registry.register_device("lamp", Arc::new(FakeTool::default()));

        let on = registry
            .execute_action(&DeviceAction::new("lamp", Action::On))
            .await;
        assert!(on.success);
        assert!(on.data.is_none());

        let status = registry
            .execute_action(&DeviceAction::new("lamp", Action::Status))
            .await;
        assert!(status.success);
        assert_eq!(status.data.unwrap()["power"], json!("on"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_in_order() {
        let lamp = Arc::new(FakeTool::default());
        let mut registry = ToolRegistry::new();
        registry.register_device("lamp", lamp.clone());
        registry.register_device(
            "fan",
            Arc::new(FakeTool {
                fail: true,
                ..Default::default()
            }),
        );
        registry.register_device(
            "heater",
            Arc::new(FakeTool {
                panic: true,
                ..Default::default()
            }),
        );

        let actions = vec![
            DeviceAction::new("lamp", Action::On),
            DeviceAction::new("ghost", Action::On),
            DeviceAction::new("fan", Action::Off),
            DeviceAction::new("heater", Action::On),
            DeviceAction::new("lamp", Action::Off),
        ];
        let outcomes = registry.execute_actions(&actions).await;

        assert_eq!(outcomes.len(), 5);
        let flags: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(flags, vec![true, false, false, false, true]);
        let devices: Vec<&str> = outcomes.iter().map(|o| o.device.as_str()).collect();
        assert_eq!(devices, vec!["lamp", "ghost", "fan", "heater", "lamp"]);
        assert!(outcomes[2].error.as_deref().unwrap().contains("pin busy"));
        assert!(outcomes[3].error.as_deref().unwrap().contains("relay stuck"));
        assert_eq!(*lamp.calls.lock().unwrap(), vec![Action::On, Action::Off]);
    }

    #[tokio::test]
    async fn test_execute_batch_counts() {
        let mut registry = ToolRegistry::new();
        registry.register_device("lamp", Arc::new(FakeTool::default()));

        let batch = ParsedBatch {
            actions: vec![
                DeviceAction::new("lamp", Action::On),
                DeviceAction::new("ghost", Action::Status),
            ],
            message: "Turning things on".into(),
            raw_text: String::new(),
        };
        let report = registry.execute_batch(&batch).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.message, "Turning things on");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0], json!({"success": true, "device": "lamp", "action": "on"}));
        assert_eq!(json["results"][1]["error"], json!("Device 'ghost' not found"));
    }

    #[test]
    fn test_register_overwrites_and_unregister() {
        let mut registry = ToolRegistry::new();
        registry.register_device("lamp", Arc::new(FakeTool::default()));
        registry.register_device("lamp", Arc::new(StatusOnly));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_devices()["lamp"], vec![Action::Status]);

        assert!(registry.unregister_device("lamp"));
        assert!(!registry.unregister_device("lamp"));
        assert!(registry.is_empty());
    }
}
