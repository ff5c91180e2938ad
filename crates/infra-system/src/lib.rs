// Chaos Infrastructure - Remote Executors
// Implements: RemoteExecutor, EndpointClientFactory

pub mod adapter_executor;
pub mod endpoint_factory;
pub mod shell_executor;

pub use adapter_executor::AdapterExecutor;
pub use endpoint_factory::{EndpointConfig, EndpointRegistry};
pub use shell_executor::{ShellExecutor, ShellTransport};
