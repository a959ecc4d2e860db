use std::fmt;

// Connection status reported to the host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connecting,
    Ok,
    BadConfig(String),
    ConnectionFailure(String),
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Ok)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ok => "ok",
            ConnectionStatus::BadConfig(_) => "bad_config",
            ConnectionStatus::ConnectionFailure(_) => "connection_failure",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ConnectionStatus::BadConfig(msg) | ConnectionStatus::ConnectionFailure(msg) => {
                Some(msg)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} ({})", self.code(), msg),
            None => f.write_str(self.code()),
        }
    }
}
