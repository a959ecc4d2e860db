use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_HOST, DEFAULT_PORT};

// Action data for renaming a device input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenameSourceAction {
    // Source number as shown on the device (1-indexed)
    #[serde(default = "default_source")]
    #[schemars(range(min = 1, max = 16))]
    pub source: u32,
    // New label, may reference variables as $(connection:name)
    #[serde(default)]
    pub label: String,
}

fn default_source() -> u32 {
    1
}

// Action data for setting a variable used in labels
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetVariableAction {
    // Full variable name, e.g. "internal:speaker"
    pub name: String,
    // Value substituted for $(name)
    pub value: String,
}

// Action data for pointing the executor at another device
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateConfigAction {
    // MV16 IP address
    #[serde(default = "default_host")]
    pub host: String,
    // TCP port
    #[serde(default = "default_port")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: u16,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
