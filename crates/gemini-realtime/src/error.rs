/// Failures of the upstream session and its transport.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect to upstream: {0}")]
    Connection(String),
    #[error("Invalid session configuration: {0}")]
    Configuration(String),
    #[error("Upstream protocol error: {0}")]
    Protocol(String),
    #[error("Upstream session is not connected")]
    NotConnected,
    #[error("Upstream transport error: {0}")]
    Transport(String),
    #[error("Failed to serialize upstream frame: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<fieldcall_core::ConfigError> for SessionError {
    fn from(err: fieldcall_core::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
