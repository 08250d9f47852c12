//! Host-side control of a GPIO peer over BLE or TCP, driven by
//! generator-produced action batches

pub mod config;
pub mod controller;
pub mod devices;
pub mod error;
pub mod parser;
pub mod tools;
pub mod transport;

pub use config::{ControllerConfig, DeviceKind, DeviceSpec, TransportMode};
pub use controller::{CommandSink, Controller};
pub use devices::{Device, DeviceError};
pub use error::{ConfigError, TransportError};
pub use parser::{Action, ActionParser, DeviceAction, ParseError, ParsedBatch};
pub use tools::{BatchReport, OutcomeRecord, ToolHandler, ToolRegistry};
pub use transport::{AckMode, SessionState, Transport};
