// Error types for orchestration

use gemlink_abstraction::ModelError;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
///
/// These never cross the `generate` boundary; they are classified and folded into a
/// `NormalizedResult`.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Configuration rejected by validation
    #[error("Invalid orchestrator configuration: {0}")]
    InvalidConfig(String),

    /// A binary chunk was not valid base64
    #[error("Failed to decode binary chunk: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Backend error
    #[error("{0}")]
    Model(#[from] ModelError),
}
