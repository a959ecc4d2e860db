use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::ConnectionStatus;

// Emitter data for connection status changes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionStatusEmitter {
    // One of connecting, ok, bad_config, connection_failure, disconnected
    pub status: String,
    // Failure reason, if any
    pub message: Option<String>,
}

impl From<&ConnectionStatus> for ConnectionStatusEmitter {
    fn from(status: &ConnectionStatus) -> Self {
        Self {
            status: status.code().to_string(),
            message: status.message().map(str::to_string),
        }
    }
}

// Emitter data for a rename written to the device
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LabelSentEmitter {
    // Source number (1-indexed)
    pub source: u32,
    // Device input index (0-indexed)
    pub input: u32,
    // Label after variable substitution
    pub label: String,
}
