// Chaos Core - Fault command orchestration (domain, ports, application)
// NO infrastructure dependencies: executors, stores and sinks are ports

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::EngineConfig;
pub use error::{ErrorKind, OrchestrationError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
