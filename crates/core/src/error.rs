// Central Error Type for the Orchestration Engine

use crate::domain::DomainError;
use crate::port::ExecutionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-stable failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Build-time (raised before any mutating remote call)
    Validation,
    UnknownFault,
    UnsupportedEndpoint,
    UnresolvedPlaceholder,
    // Execution-time
    CommandFailed,
    NotConverged,
    Unreachable,
    Cancelled,
    // Ambient
    Storage,
    Config,
    Internal,
}

impl ErrorKind {
    /// True for errors raised while building a sequence
    pub fn is_build_time(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::UnknownFault
                | ErrorKind::UnsupportedEndpoint
                | ErrorKind::UnresolvedPlaceholder
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::UnknownFault => "UNKNOWN_FAULT",
            ErrorKind::UnsupportedEndpoint => "UNSUPPORTED_ENDPOINT",
            ErrorKind::UnresolvedPlaceholder => "UNRESOLVED_PLACEHOLDER",
            ErrorKind::CommandFailed => "COMMAND_FAILED",
            ErrorKind::NotConverged => "NOT_CONVERGED",
            ErrorKind::Unreachable => "UNREACHABLE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Engine-level error type
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unresolved placeholder(s) {names:?} in command '{command}'")]
    UnresolvedPlaceholder { command: String, names: Vec<String> },

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::Domain(DomainError::UnknownFault(_)) => ErrorKind::UnknownFault,
            OrchestrationError::Domain(DomainError::UnknownEndpointType(_))
            | OrchestrationError::Domain(DomainError::UnsupportedFault { .. }) => {
                ErrorKind::UnsupportedEndpoint
            }
            OrchestrationError::Domain(DomainError::ValidationError(_))
            | OrchestrationError::Validation(_) => ErrorKind::Validation,
            OrchestrationError::Domain(DomainError::InvalidStateTransition { .. }) => {
                ErrorKind::Internal
            }
            OrchestrationError::UnresolvedPlaceholder { .. } => ErrorKind::UnresolvedPlaceholder,
            OrchestrationError::Execution(ExecutionError::Unreachable(_)) => ErrorKind::Unreachable,
            OrchestrationError::Execution(_) => ErrorKind::CommandFailed,
            OrchestrationError::Storage(_) => ErrorKind::Storage,
            OrchestrationError::Config(_) | OrchestrationError::Serialization(_) => {
                ErrorKind::Config
            }
            OrchestrationError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias using OrchestrationError
pub type Result<T> = std::result::Result<T, OrchestrationError>;
