//! Error handling for the AgentLink CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("AgentLink error: {0}")]
    Link(#[from] agentlink_core::LinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Simulated peer error: {0}")]
    Peer(#[from] agentlink_core::TopicClientError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML rendering error: {0}")]
    TomlRendering(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(format!("{:#}", err))
    }
}
