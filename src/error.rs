//! Error taxonomy for the pipeline.

use thiserror::Error;

pub type FlowResult<T> = Result<T, FlowError>;

#[derive(Debug, Error)]
pub enum FlowError {
    /// More than one cache entry matches a predicate that must be unique.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// The computation engine reported a failure.
    #[error("Computation failed: {0}")]
    ComputationFailed(String),

    /// A chain could not be reconstructed (broken link, missing node, bad annotation).
    #[error("Chain integrity error: {0}")]
    ChainIntegrity(String),

    /// Object or document store unreachable.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A job update that would regress status or skip a block.
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid source locator: {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, FlowError::ChainIntegrity(_))
    }
}

impl From<tokio::task::JoinError> for FlowError {
    fn from(err: tokio::task::JoinError) -> Self {
        FlowError::ComputationFailed(format!("Task aborted: {}", err))
    }
}

impl From<bincode::Error> for FlowError {
    fn from(err: bincode::Error) -> Self {
        FlowError::ChainIntegrity(format!("Malformed chain node: {}", err))
    }
}
