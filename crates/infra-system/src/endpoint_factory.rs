// Endpoint client factory
// Maps configured endpoint names onto concrete executors
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use chaos_core::domain::EndpointType;
use chaos_core::error::{OrchestrationError, Result};
use chaos_core::port::{EndpointClientFactory, EndpointRef, RemoteExecutor};

use crate::adapter_executor::AdapterExecutor;
use crate::shell_executor::{ShellExecutor, ShellTransport};

/// How one named endpoint is reached
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// CLI on the orchestrator host (kubectl, docker, local agent)
    Local {
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote machine over ssh
    Ssh {
        destination: String,
        #[serde(default)]
        options: Vec<String>,
    },
    /// Hypervisor adapter REST service
    Adapter {
        base_url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl EndpointConfig {
    fn serves(&self, endpoint_type: EndpointType) -> bool {
        match self {
            EndpointConfig::Adapter { .. } => endpoint_type == EndpointType::Hypervisor,
            EndpointConfig::Local { .. } | EndpointConfig::Ssh { .. } => {
                endpoint_type != EndpointType::Hypervisor
            }
        }
    }

    fn connect(&self, default_timeout: Duration) -> Arc<dyn RemoteExecutor> {
        match self {
            EndpointConfig::Local { env } => {
                Arc::new(ShellExecutor::local(default_timeout).with_env(env.clone()))
            }
            EndpointConfig::Ssh {
                destination,
                options,
            } => Arc::new(ShellExecutor::new(
                ShellTransport::Ssh {
                    destination: destination.clone(),
                    options: options.clone(),
                },
                default_timeout,
            )),
            EndpointConfig::Adapter { base_url, token } => Arc::new(AdapterExecutor::new(
                base_url.clone(),
                token.clone(),
                default_timeout,
            )),
        }
    }
}

/// Endpoint registry
///
/// Executors are created on first use and shared by later runs against the
/// same endpoint.
pub struct EndpointRegistry {
    endpoints: HashMap<String, EndpointConfig>,
    default_timeout: Duration,
    clients: Mutex<HashMap<String, Arc<dyn RemoteExecutor>>>,
}

impl EndpointRegistry {
    pub fn new(endpoints: HashMap<String, EndpointConfig>, default_timeout: Duration) -> Self {
        Self {
            endpoints,
            default_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Parse a JSON object of `name -> endpoint config`
    pub fn from_json(json: &str, default_timeout: Duration) -> Result<Self> {
        let endpoints: HashMap<String, EndpointConfig> = serde_json::from_str(json)
            .map_err(|e| OrchestrationError::Config(format!("invalid endpoint file: {}", e)))?;
        Ok(Self::new(endpoints, default_timeout))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl EndpointClientFactory for EndpointRegistry {
    fn executor_for(&self, endpoint: &EndpointRef) -> Result<Arc<dyn RemoteExecutor>> {
        let config = self.endpoints.get(&endpoint.name).ok_or_else(|| {
            OrchestrationError::Config(format!("endpoint '{}' is not configured", endpoint.name))
        })?;
        if !config.serves(endpoint.endpoint_type) {
            return Err(OrchestrationError::Config(format!(
                "endpoint '{}' cannot serve {} faults",
                endpoint.name, endpoint.endpoint_type
            )));
        }

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| OrchestrationError::Internal("endpoint cache poisoned".to_string()))?;
        if let Some(client) = clients.get(&endpoint.name) {
            return Ok(client.clone());
        }

        debug!(endpoint = %endpoint.name, kind = %endpoint.endpoint_type, "Creating endpoint client");
        let client = config.connect(self.default_timeout);
        clients.insert(endpoint.name.clone(), client.clone());
        Ok(client)
    }
}
