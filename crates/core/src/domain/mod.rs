// Domain Layer - Faults, command descriptors and task lifecycle

pub mod command;
pub mod error;
pub mod fault;
pub mod task;

// Re-exports
pub use command::{
    AsyncTaskPolicy, CommandDescriptor, CommandResult, KnownFailure, KnownFailureTable,
    OutputExtractor, PropertyBag, Sequence,
};
pub use error::DomainError;
pub use fault::{EndpointType, FaultFamily, FaultName, FaultOperation, FaultSpec, FaultTarget};
pub use task::{ChildTaskView, FaultRun, TaskHandle, TaskStatus};
