// Hypervisor adapter builder
//
// Every operation is a single REST call against the adapter control plane
// (`METHOD PATH [BODY]`). Mutating calls start an adapter task which is
// polled until it leaves the TRIGGERED state.

use super::ResolvedFault;
use crate::application::constants::{DISK_BACKING_PROPERTIES, HYPERVISOR_PENDING_MARKER};
use crate::application::known_failures;
use crate::config::EngineConfig;
use crate::domain::{
    AsyncTaskPolicy, CommandDescriptor, FaultName, FaultOperation, FaultSpec, FaultTarget, Sequence,
};
use crate::error::{OrchestrationError, Result};
use std::sync::Arc;

const TASK_ID_PATTERN: &str = r#""taskId"\s*:\s*"([^"]+)""#;
const TASK_ACCEPTED_PATTERN: &str = r#""taskStatus"\s*:\s*"(TRIGGERED|COMPLETED)""#;
const DISK_CONNECT_BODY: &str =
    r#"{"type":"${type}","backingType":"${backingType}","backingVMDKFile":"${backingVMDKFile}"}"#;

fn json_field_pattern(field: &str) -> String {
    format!(r#""{}"\s*:\s*"([^"]+)""#, field)
}

#[derive(Debug, Clone)]
pub struct HypervisorBuilder {
    config: Arc<EngineConfig>,
}

impl HypervisorBuilder {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub(super) fn resolve_targets(&self, spec: &FaultSpec) -> Result<Vec<String>> {
        match &spec.target {
            FaultTarget::Hypervisor { resource_id } if !resource_id.trim().is_empty() => {
                Ok(vec![resource_id.clone()])
            }
            other => Err(OrchestrationError::Validation(format!(
                "hypervisor faults need a resource id, got {:?}",
                other
            ))),
        }
    }

    fn task_policy(&self) -> AsyncTaskPolicy {
        AsyncTaskPolicy {
            status_command_template: "GET /api/v1/tasks/${taskId}".to_string(),
            pending_marker: HYPERVISOR_PENDING_MARKER.to_string(),
            poll_interval_secs: self.config.hypervisor_poll_interval_secs,
            timeout_secs: self.config.hypervisor_timeout_secs,
        }
    }

    /// Mutating call that starts an adapter task
    fn trigger(&self, spec: &FaultSpec, command: String, table: &str) -> CommandDescriptor {
        CommandDescriptor::new(command)
            .known_failures(known_failures::table(&format!("hypervisor.{}", table)))
            .expect_output(TASK_ACCEPTED_PATTERN)
            .extract("taskId", TASK_ID_PATTERN)
            .timeout(spec.timeout_secs())
            .await_task(self.task_policy())
    }

    fn query(spec: &FaultSpec, path: String) -> CommandDescriptor {
        CommandDescriptor::new(format!("GET {}", path))
            .described(format!("Query {}", path))
            .timeout(spec.timeout_secs())
    }

    pub(super) fn build(&self, resolved: &ResolvedFault, operation: FaultOperation) -> Result<Sequence> {
        let mut sequence = Sequence::new();
        for resource in &resolved.resources {
            sequence.push(self.descriptor(resolved, resource, operation)?);
        }
        Ok(sequence)
    }

    fn descriptor(
        &self,
        resolved: &ResolvedFault,
        id: &str,
        operation: FaultOperation,
    ) -> Result<CommandDescriptor> {
        let spec = &resolved.spec;
        let vm = format!("/api/v1/vms/{}", id);

        let descriptor = match (resolved.fault, operation) {
            (FaultName::VmPowerOff, FaultOperation::Inject) => self
                .trigger(spec, format!("POST {}/power-off", vm), "power-off")
                .described(format!("Power off VM {}", id)),
            (FaultName::VmPowerOff, FaultOperation::Remediate) => self
                .trigger(spec, format!("POST {}/power-on", vm), "power-on")
                .described(format!("Power on VM {}", id)),
            (FaultName::VmSuspend, FaultOperation::Inject) => self
                .trigger(spec, format!("POST {}/suspend", vm), "suspend")
                .described(format!("Suspend VM {}", id)),
            (FaultName::VmSuspend, FaultOperation::Remediate) => self
                .trigger(spec, format!("POST {}/resume", vm), "resume")
                .described(format!("Resume VM {}", id)),
            (FaultName::VmPowerOff | FaultName::VmSuspend, FaultOperation::Status) => {
                Self::query(spec, vm)
            }

            (FaultName::VmNicDisconnect, _) => {
                let nic = format!("{}/nics/{}", vm, spec.required_arg("nicId")?);
                match operation {
                    FaultOperation::Inject => self
                        .trigger(spec, format!("POST {}/disconnect", nic), "nic-disconnect")
                        .described(format!("Disconnect NIC {}", nic)),
                    FaultOperation::Remediate => self
                        .trigger(spec, format!("POST {}/connect", nic), "nic-connect")
                        .described(format!("Reconnect NIC {}", nic)),
                    FaultOperation::Status => Self::query(spec, nic),
                }
            }

            (FaultName::VmDiskDisconnect, _) => {
                let disk = format!("{}/disks/{}", vm, spec.required_arg("diskId")?);
                match operation {
                    FaultOperation::Inject => {
                        let mut trigger = self
                            .trigger(spec, format!("POST {}/disconnect", disk), "disk-disconnect")
                            .described(format!("Disconnect disk {}", disk));
                        for property in DISK_BACKING_PROPERTIES {
                            trigger = trigger.extract(property, json_field_pattern(property));
                        }
                        trigger
                    }
                    FaultOperation::Remediate => {
                        self.require_disk_backing(resolved)?;
                        let command = format!("POST {}/connect {}", disk, DISK_CONNECT_BODY);
                        self.trigger(spec, command, "disk-connect")
                            .described(format!("Reconnect disk {}", disk))
                    }
                    FaultOperation::Status => Self::query(spec, disk),
                }
            }

            (FaultName::HostDisconnect, _) => {
                let host = format!("/api/v1/hosts/{}", id);
                match operation {
                    FaultOperation::Inject => self
                        .trigger(spec, format!("POST {}/disconnect", host), "host-disconnect")
                        .described(format!("Disconnect host {}", id)),
                    FaultOperation::Remediate => self
                        .trigger(spec, format!("POST {}/connect", host), "host-connect")
                        .described(format!("Reconnect host {}", id)),
                    FaultOperation::Status => Self::query(spec, host),
                }
            }

            (other, _) => {
                return Err(OrchestrationError::Internal(format!(
                    "'{}' is not a hypervisor fault",
                    other
                )))
            }
        };
        Ok(descriptor)
    }

    /// Disk reconnect needs the backing captured when the disk was disconnected
    fn require_disk_backing(&self, resolved: &ResolvedFault) -> Result<()> {
        let missing: Vec<&str> = DISK_BACKING_PROPERTIES
            .iter()
            .copied()
            .filter(|name| {
                resolved
                    .properties
                    .get(*name)
                    .map_or(true, |v| v.trim().is_empty())
            })
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(OrchestrationError::Validation(format!(
            "cannot reconnect disk for run '{}': missing recorded properties {:?}",
            resolved.spec.run_id, missing
        )))
    }
}
