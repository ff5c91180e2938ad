// Engine Configuration

use crate::application::constants::*;
use crate::application::known_failures;
use crate::error::{OrchestrationError, Result};
use serde::{Deserialize, Serialize};

/// Fixed-cadence polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

/// Engine configuration (loaded by the composition root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the injection agent on Linux hosts
    pub script_base_path: String,
    /// Agent entry point used to submit/remediate/query faults
    pub agent_binary: String,
    /// Agent daemon start script (Kubernetes pipeline, phase 4)
    pub agent_start_binary: String,
    /// Local path of the packaged agent archive copied into pods
    pub k8s_agent_archive: String,
    /// Directory created when the agent archive is extracted
    pub k8s_agent_dir: String,
    /// Image patched into a container to make it fail its readiness probe
    pub not_ready_image: String,
    /// Readiness / endpoint polling cadence
    pub convergence: PollSettings,
    /// Retries for the Kubernetes agent submission phase
    pub agent_submit_retries: u32,
    pub agent_submit_retry_interval_secs: u64,
    pub hypervisor_poll_interval_secs: u64,
    pub hypervisor_timeout_secs: u64,
    /// Child task polling cadence for fan-out faults
    pub child_poll: PollSettings,
    /// Fixed seed for random target selection (reproducible runs)
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_base_path: DEFAULT_SCRIPT_BASE_PATH.to_string(),
            agent_binary: DEFAULT_AGENT_BINARY.to_string(),
            agent_start_binary: DEFAULT_AGENT_START_BINARY.to_string(),
            k8s_agent_archive: DEFAULT_K8S_AGENT_ARCHIVE.to_string(),
            k8s_agent_dir: DEFAULT_K8S_AGENT_DIR.to_string(),
            not_ready_image: DEFAULT_NOT_READY_IMAGE.to_string(),
            convergence: PollSettings {
                max_attempts: CONVERGENCE_MAX_ATTEMPTS,
                interval_secs: CONVERGENCE_INTERVAL_SECS,
            },
            agent_submit_retries: AGENT_SUBMIT_RETRIES,
            agent_submit_retry_interval_secs: AGENT_SUBMIT_RETRY_INTERVAL_SECS,
            hypervisor_poll_interval_secs: HYPERVISOR_POLL_INTERVAL_SECS,
            hypervisor_timeout_secs: HYPERVISOR_TIMEOUT_SECS,
            child_poll: PollSettings {
                max_attempts: CHILD_MAX_POLLS,
                interval_secs: CHILD_POLL_INTERVAL_SECS,
            },
            random_seed: None,
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would build unusable sequences
    pub fn validate(&self) -> Result<()> {
        if self.script_base_path.trim().is_empty() {
            return Err(OrchestrationError::Config(
                "script_base_path must not be empty".to_string(),
            ));
        }
        if self.agent_binary.trim().is_empty() {
            return Err(OrchestrationError::Config(
                "agent_binary must not be empty".to_string(),
            ));
        }
        if self.convergence.max_attempts == 0 || self.child_poll.max_attempts == 0 {
            return Err(OrchestrationError::Config(
                "poll attempts must be at least 1".to_string(),
            ));
        }
        if self.hypervisor_poll_interval_secs == 0 {
            return Err(OrchestrationError::Config(
                "hypervisor_poll_interval_secs must be positive".to_string(),
            ));
        }
        known_failures::catalog()?;
        Ok(())
    }
}

/// Normalize a directory path to exactly one trailing `/`
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    format!("{}/", trimmed)
}
