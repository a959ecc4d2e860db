use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;

pub const DEFAULT_HOST: &str = "192.168.1.100";
pub const DEFAULT_PORT: u16 = 9990;

// Connection settings for a single MV16 device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceConfig {
    /// MV16 IP address
    #[serde(default = "default_host")]
    pub host: String,
    /// Port
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

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
        .normalized()
    }

    /// Port 0 means unset and falls back to the default port.
    pub fn normalized(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        self
    }

    // Read MV16_HOST / MV16_PORT, falling back to the defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("MV16_HOST").unwrap_or_else(default_host);
        let port = lookup("MV16_PORT")
            .and_then(|p| p.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Self::new(host, port)
    }

    /// Check the config before a socket is opened.
    ///
    /// Returns the reason reported to the host as a bad-config status.
    pub fn validate(&self) -> Result<(), String> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err("Missing host/port".to_string());
        }
        if host.parse::<IpAddr>().is_err() {
            return Err("Invalid IP address".to_string());
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        let host = self.host.trim();
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]:{}", v6, self.port),
            _ => format!("{}:{}", host, self.port),
        }
    }
}

/// Config field definitions handed to the host, as JSON Schema.
pub fn config_fields() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(DeviceConfig)).unwrap_or_default()
}
