// Linux host builder

use super::agent::agent_command;
use super::{agent_base, ResolvedFault};
use crate::application::known_failures;
use crate::config::EngineConfig;
use crate::domain::{CommandDescriptor, FaultName, FaultOperation, FaultSpec, FaultTarget, Sequence};
use crate::error::{OrchestrationError, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LinuxBuilder {
    config: Arc<EngineConfig>,
}

impl LinuxBuilder {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub(super) fn resolve_targets(&self, spec: &FaultSpec) -> Result<Vec<String>> {
        match &spec.target {
            FaultTarget::Host { host } if !host.trim().is_empty() => Ok(vec![host.clone()]),
            other => Err(OrchestrationError::Validation(format!(
                "linux faults need a host target, got {:?}",
                other
            ))),
        }
    }

    pub(super) fn build(&self, resolved: &ResolvedFault, operation: FaultOperation) -> Result<Sequence> {
        let spec = &resolved.spec;
        let fault = resolved.fault;

        if operation == FaultOperation::Remediate {
            if fault.remediation_unsupported() {
                return Ok(Sequence::new());
            }
            if fault == FaultName::KillProcess {
                // The agent cannot restart what it killed; only an operator
                // supplied command can.
                return Ok(match spec.arg("remediationCommand") {
                    Some(command) => vec![CommandDescriptor::new(command)
                        .described(format!("Run remediation command for {}", fault))
                        .timeout(spec.timeout_secs())],
                    None => Sequence::new(),
                });
            }
        }

        let base = agent_base(spec, &self.config);
        let command = agent_command(&base, &self.config.agent_binary, spec, fault, operation)?;
        let table = format!("linux.{}", operation.agent_operation());

        Ok(vec![CommandDescriptor::new(command)
            .described(format!("{} {} fault", operation.agent_operation(), fault))
            .known_failures(known_failures::table(&table))
            .timeout(spec.timeout_secs())])
    }
}
