// Docker builder
// Agent faults reuse the Linux grammar inside `docker exec`; container state
// faults drive the docker CLI directly.

use super::agent::agent_command;
use super::{agent_base, ResolvedFault};
use crate::application::known_failures;
use crate::application::template::shell_quote;
use crate::config::EngineConfig;
use crate::domain::{
    CommandDescriptor, FaultFamily, FaultName, FaultOperation, FaultSpec, FaultTarget, Sequence,
};
use crate::error::{OrchestrationError, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DockerBuilder {
    config: Arc<EngineConfig>,
}

impl DockerBuilder {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub(super) fn resolve_targets(&self, spec: &FaultSpec) -> Result<Vec<String>> {
        match &spec.target {
            FaultTarget::Docker { container } if !container.trim().is_empty() => {
                Ok(vec![container.clone()])
            }
            other => Err(OrchestrationError::Validation(format!(
                "docker faults need a container target, got {:?}",
                other
            ))),
        }
    }

    pub(super) fn build(&self, resolved: &ResolvedFault, operation: FaultOperation) -> Result<Sequence> {
        let mut sequence = Sequence::new();
        for container in &resolved.resources {
            let part = match resolved.fault.family() {
                FaultFamily::Agent => self.agent_fault(resolved, container, operation)?,
                FaultFamily::ContainerState => self.container_state(resolved, container, operation),
                _ => {
                    return Err(OrchestrationError::Internal(format!(
                        "'{}' is not a docker fault",
                        resolved.fault
                    )))
                }
            };
            sequence.extend(part);
        }
        Ok(sequence)
    }

    fn agent_fault(
        &self,
        resolved: &ResolvedFault,
        container: &str,
        operation: FaultOperation,
    ) -> Result<Sequence> {
        let spec = &resolved.spec;
        let fault = resolved.fault;

        let inner = match operation {
            FaultOperation::Remediate if fault.remediation_unsupported() => return Ok(Sequence::new()),
            FaultOperation::Remediate if fault == FaultName::KillProcess => {
                match spec.arg("remediationCommand") {
                    Some(command) => command.to_string(),
                    None => return Ok(Sequence::new()),
                }
            }
            _ => {
                let base = agent_base(spec, &self.config);
                agent_command(&base, &self.config.agent_binary, spec, fault, operation)?
            }
        };

        let table = format!("linux.{}", operation.agent_operation());
        Ok(vec![CommandDescriptor::new(format!(
            "docker exec {} sh -c {}",
            container,
            shell_quote(&inner)
        ))
        .described(format!(
            "{} {} fault in container {}",
            operation.agent_operation(),
            fault,
            container
        ))
        .known_failures(known_failures::table(&table))
        .timeout(spec.timeout_secs())])
    }

    fn container_state(
        &self,
        resolved: &ResolvedFault,
        container: &str,
        operation: FaultOperation,
    ) -> Sequence {
        let (verb, table) = match (resolved.fault, operation) {
            (FaultName::ContainerStop, FaultOperation::Inject) => ("stop", "docker.stop"),
            (FaultName::ContainerStop, FaultOperation::Remediate) => ("start", "docker.start"),
            (FaultName::ContainerPause, FaultOperation::Inject) => ("pause", "docker.pause"),
            (FaultName::ContainerPause, FaultOperation::Remediate) => ("unpause", "docker.unpause"),
            _ => {
                return vec![CommandDescriptor::new(format!(
                    "docker inspect -f '{{{{.State.Status}}}}' {}",
                    container
                ))
                .described(format!("Query state of container {}", container))]
            }
        };

        vec![CommandDescriptor::new(format!("docker {} {}", verb, container))
            .described(format!("{} container {}", verb, container))
            .known_failures(known_failures::table(table))
            .timeout(resolved.spec.timeout_secs())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::CancelToken;
    use crate::application::sequence::SequenceExecutor;
    use crate::domain::CommandResult;
    use crate::port::remote_executor::mocks::ScriptedExecutor;
    use std::collections::BTreeMap;

    fn resolved(fault: FaultName, args: &[(&str, &str)]) -> ResolvedFault {
        let spec = FaultSpec {
            run_id: "run-3".to_string(),
            fault_name: fault.to_string(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            endpoint_type: "DOCKER".to_string(),
            endpoint_name: "docker-a".to_string(),
            injection_home_dir: None,
            target: FaultTarget::Docker {
                container: "web".to_string(),
            },
            timeout_ms: 10_000,
            random_injection: false,
        };
        ResolvedFault::new(spec, fault, vec!["web".to_string()])
    }

    fn builder() -> DockerBuilder {
        DockerBuilder::new(Arc::new(EngineConfig::default()))
    }

    #[test]
    fn test_agent_fault_wrapped_in_docker_exec() {
        let seq = builder()
            .build(&resolved(FaultName::Cpu, &[("load", "70")]), FaultOperation::Inject)
            .unwrap();
        assert_eq!(seq.len(), 1);
        assert!(seq[0].command_template.starts_with(
            "docker exec web sh -c '/opt/chaos/infra_agent/infra_submit --operation inject --faultname cpuFault"
        ));
        assert_eq!(seq[0].known_failures, known_failures::table("linux.inject"));
    }

    #[test]
    fn test_state_fault_pairs() {
        let stop = resolved(FaultName::ContainerStop, &[]);
        assert_eq!(
            builder().build(&stop, FaultOperation::Inject).unwrap()[0].command_template,
            "docker stop web"
        );
        assert_eq!(
            builder().build(&stop, FaultOperation::Remediate).unwrap()[0].command_template,
            "docker start web"
        );

        let pause = resolved(FaultName::ContainerPause, &[]);
        assert_eq!(
            builder().build(&pause, FaultOperation::Remediate).unwrap()[0].command_template,
            "docker unpause web"
        );
        assert_eq!(
            builder().build(&pause, FaultOperation::Status).unwrap()[0].command_template,
            "docker inspect -f '{{.State.Status}}' web"
        );
    }

    #[tokio::test]
    async fn test_already_paused_is_benign() {
        let seq = builder()
            .build(&resolved(FaultName::ContainerPause, &[]), FaultOperation::Inject)
            .unwrap();
        let remote = ScriptedExecutor::new().on(
            "docker pause",
            vec![CommandResult::new(
                1,
                "Error response from daemon: Container web is already paused",
            )],
        );

        let result = SequenceExecutor::new(CancelToken::never())
            .execute(&seq, &remote)
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.messages.is_empty());
    }

    #[test]
    fn test_kernel_panic_remediation_is_empty() {
        let seq = builder()
            .build(&resolved(FaultName::KernelPanic, &[]), FaultOperation::Remediate)
            .unwrap();
        assert!(seq.is_empty());
    }
}
