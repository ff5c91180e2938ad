// Remote Executor Port
// One implementation per backend (SSH shell, kubectl proxy, docker CLI, hypervisor adapter)

use crate::domain::{CommandResult, EndpointType};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Transport-level errors (distinct from a command returning a failure)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Backend connection could not be established (not retried by the engine)
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Remote Executor trait
///
/// Turns a resolved command string into a raw [`CommandResult`]. A non-zero
/// exit code is a normal `Ok` result; `Err` is reserved for transport failures.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute a command
    ///
    /// # Arguments
    /// * `command` - Fully resolved command text
    /// * `timeout` - Per-call timeout (`None` means backend default)
    ///
    /// # Errors
    /// - ExecutionError::Unreachable if the backend connection fails
    /// - ExecutionError::Timeout if the call exceeds `timeout`
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<CommandResult, ExecutionError>;
}

/// Reference to a configured endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointRef {
    pub name: String,
    pub endpoint_type: EndpointType,
}

/// Endpoint client factory, keyed by endpoint descriptor
pub trait EndpointClientFactory: Send + Sync {
    /// Obtain the executor handle for one fault run
    fn executor_for(&self, endpoint: &EndpointRef) -> Result<Arc<dyn RemoteExecutor>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::OrchestrationError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    type Reply = std::result::Result<CommandResult, ExecutionError>;

    struct Rule {
        needle: String,
        replies: Vec<Reply>,
        served: usize,
    }

    /// Scripted executor: replies are matched by command substring, in rule order.
    /// Each rule serves its replies in order and then repeats the last one.
    /// Unmatched commands succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, needle: impl Into<String>, replies: Vec<CommandResult>) -> Self {
            self.on_result(needle, replies.into_iter().map(Ok).collect())
        }

        pub fn on_error(self, needle: impl Into<String>, error: ExecutionError) -> Self {
            self.on_result(needle, vec![Err(error)])
        }

        fn on_result(self, needle: impl Into<String>, replies: Vec<Reply>) -> Self {
            self.rules.lock().unwrap().push(Rule {
                needle: needle.into(),
                replies,
                served: 0,
            });
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl RemoteExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            command: &str,
            _timeout: Option<Duration>,
        ) -> std::result::Result<CommandResult, ExecutionError> {
            self.calls.lock().unwrap().push(command.to_string());

            let mut rules = self.rules.lock().unwrap();
            if let Some(rule) = rules.iter_mut().find(|r| command.contains(&r.needle)) {
                if rule.replies.is_empty() {
                    return Ok(CommandResult::success(""));
                }
                let idx = rule.served.min(rule.replies.len() - 1);
                rule.served += 1;
                return rule.replies[idx].clone();
            }
            Ok(CommandResult::success(""))
        }
    }

    /// Factory returning pre-registered executors by endpoint name
    #[derive(Default)]
    pub struct StaticExecutorFactory {
        executors: HashMap<String, Arc<dyn RemoteExecutor>>,
    }

    impl StaticExecutorFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, name: impl Into<String>, executor: Arc<dyn RemoteExecutor>) -> Self {
            self.executors.insert(name.into(), executor);
            self
        }
    }

    impl EndpointClientFactory for StaticExecutorFactory {
        fn executor_for(&self, endpoint: &EndpointRef) -> Result<Arc<dyn RemoteExecutor>> {
            self.executors.get(&endpoint.name).cloned().ok_or_else(|| {
                OrchestrationError::Config(format!("no executor for endpoint '{}'", endpoint.name))
            })
        }
    }
}
