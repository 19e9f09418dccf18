//! Error types surfaced by the shipper.

use crate::client::ClientError;
use crate::config::ConfigError;

/// Errors returned by [`LogShipper`](crate::buffer::LogShipper) operations.
#[derive(Debug)]
pub enum ShipperError {
    /// Unsupported auth type, invalid index frequency or other bad settings
    Configuration(String),

    /// A capability required by the selected auth type is missing at runtime
    Environment(String),

    /// The bulk write or ping against the backend failed
    Transport(ClientError),
}

impl std::fmt::Display for ShipperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShipperError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ShipperError::Environment(msg) => write!(f, "Environment error: {}", msg),
            ShipperError::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for ShipperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShipperError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for ShipperError {
    fn from(err: ClientError) -> Self {
        ShipperError::Transport(err)
    }
}

impl From<ConfigError> for ShipperError {
    fn from(err: ConfigError) -> Self {
        match err.env_var {
            Some(var) => ShipperError::Configuration(format!("{}: {}", var, err.message)),
            None => ShipperError::Configuration(err.message),
        }
    }
}

impl ShipperError {
    /// True for errors that come from talking to the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, ShipperError::Transport(_))
    }
}
