// Port Layer - Interfaces for external collaborators

pub mod child_task;
pub mod metadata_store;
pub mod remote_executor;
pub mod task_sink;
pub mod time_provider;

// Re-exports
pub use child_task::ChildTaskSource;
pub use metadata_store::FaultMetadataStore;
pub use remote_executor::{EndpointClientFactory, EndpointRef, ExecutionError, RemoteExecutor};
pub use task_sink::TaskSink;
pub use time_provider::TimeProvider;
