// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid task state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown fault: {0}")]
    UnknownFault(String),

    #[error("Unknown endpoint type: {0}")]
    UnknownEndpointType(String),

    #[error("Fault '{fault}' is not supported on {endpoint} endpoints")]
    UnsupportedFault { fault: String, endpoint: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
