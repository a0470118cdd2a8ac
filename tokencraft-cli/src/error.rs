use thiserror::Error;

/// Errors raised by the CLI before anything reaches the connector.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read keypair from '{path}': {reason}")]
    Keypair { path: String, reason: String },

    #[error("Invalid base64 encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Deserialization failed: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
