use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("inventory has no servers")]
    EmptyInventory,

    #[error("section {0} not found in inventory")]
    SectionNotFound(String),

    #[error("invalid service name '{0}': expected a systemd unit name")]
    InvalidService(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("ansible not found: install ansible or add it to PATH")]
    AnsibleNotFound,

    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("remote execution failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PanelError>;
