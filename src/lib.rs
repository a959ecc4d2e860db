//! # rship-mv16-labels
//!
//! rship executor for renaming inputs on MV16 video matrix devices.
//!
//! The executor keeps one TCP connection to the device and writes
//! `INPUT LABELS:` blocks to it. Labels may reference variables as
//! `$(connection:name)`, which are resolved before the command is sent.

pub mod actions;
pub mod client;
pub mod command;
pub mod config;
pub mod emitters;
pub mod instance;
pub mod service;
pub mod status;
pub mod variables;

// Re-export the main service and commonly used types
pub use actions::{RenameSourceAction, SetVariableAction, UpdateConfigAction};
pub use client::Mv16Client;
pub use command::{LabelCodec, LabelCommand};
pub use config::DeviceConfig;
pub use emitters::{ConnectionStatusEmitter, LabelSentEmitter};
pub use instance::{InstanceEvent, LabelInstance};
pub use service::Mv16Service;
pub use status::ConnectionStatus;
pub use variables::{VariableResolver, VariableStore};
