#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TasklistError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("unexpected response from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid status '{0}' (expected WAITING, IN_PROGRESS, COMPLETED or CANCELED)")]
    InvalidStatus(String),

    #[error("{0}")]
    Other(String),
}

impl TasklistError {
    /// Network-level failures and non-2xx responses. These are the ones worth retrying.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }

    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}
