//! Tool dispatch for device actions
//!
//! This module handles:
//! - Registering named device handlers
//! - Checking an action against the handler's declared capabilities
//! - Invoking the handler with per-action failure isolation
//! - Aggregating batch outcomes

mod registry;

pub use registry::{BatchReport, OutcomeRecord, ToolRegistry};

use crate::devices::DeviceError;
use crate::parser::Action;
use async_trait::async_trait;

/// Status payload returned by a handler
pub type StatusMap = serde_json::Map<String, serde_json::Value>;

/// A device the dispatcher can drive.
///
/// Only actions listed by [`supported_actions`](ToolHandler::supported_actions)
/// are ever invoked; the defaults for `on`/`off` reject the call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn supported_actions(&self) -> &'static [Action];

    async fn on(&self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Action::On))
    }

    async fn off(&self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Action::Off))
    }

    async fn status(&self) -> Result<StatusMap, DeviceError>;
}
