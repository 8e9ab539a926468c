//! Error types for leaktest-container.

use thiserror::Error;

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to provision the working directory or container instance
    #[error("provisioning failed: {0}")]
    Provision(String),

    /// Failed to register or stage the artifact
    #[error("deployment failed: {0}")]
    Deploy(String),

    /// Failed to start the container
    #[error("startup failed: {0}")]
    Startup(String),

    /// Container is not in the expected state
    #[error("invalid container state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Loading context or metadata region failure
    #[error("loading context error: {0}")]
    Context(String),

    /// Artifact descriptor could not be parsed
    #[error("descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
