// Fault Sequence Builders
//
// One builder per endpoint family, selected by endpoint type. A builder first
// resolves the fault's concrete targets, then turns the resolved fault into
// the INJECT / REMEDIATE / STATUS sequences.

pub mod agent;
mod docker;
mod hypervisor;
mod kubernetes;
mod linux;

pub use docker::DockerBuilder;
pub use hypervisor::HypervisorBuilder;
pub use kubernetes::{select_targets, KubernetesBuilder};
pub use linux::LinuxBuilder;

use crate::config::{normalize_base_path, EngineConfig};
use crate::domain::{
    DomainError, EndpointType, FaultFamily, FaultName, FaultOperation, FaultSpec, PropertyBag,
    Sequence,
};
use crate::error::Result;
use crate::port::{EndpointClientFactory, EndpointRef, RemoteExecutor};
use std::sync::Arc;

/// A fault whose targets have been resolved and whose prior properties are known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFault {
    pub spec: FaultSpec,
    pub fault: FaultName,
    /// Concrete resources the sequences act on (hosts, pods, services, containers, VMs)
    pub resources: Vec<String>,
    /// Properties persisted by earlier runs of the same fault
    pub properties: PropertyBag,
}

impl ResolvedFault {
    pub fn new(spec: FaultSpec, fault: FaultName, resources: Vec<String>) -> Self {
        Self {
            spec,
            fault,
            resources,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = properties;
        self
    }
}

/// Builder for one endpoint family
#[derive(Debug, Clone)]
pub enum FaultBuilder {
    Linux(LinuxBuilder),
    Kubernetes(KubernetesBuilder),
    Docker(DockerBuilder),
    Hypervisor(HypervisorBuilder),
}

impl FaultBuilder {
    pub fn for_endpoint(endpoint_type: EndpointType, config: Arc<EngineConfig>) -> Self {
        match endpoint_type {
            EndpointType::Linux => FaultBuilder::Linux(LinuxBuilder::new(config)),
            EndpointType::Kubernetes => FaultBuilder::Kubernetes(KubernetesBuilder::new(config)),
            EndpointType::Docker => FaultBuilder::Docker(DockerBuilder::new(config)),
            EndpointType::Hypervisor => FaultBuilder::Hypervisor(HypervisorBuilder::new(config)),
        }
    }

    /// Select the builder named by a fault spec's endpoint type
    pub fn for_spec(spec: &FaultSpec, config: Arc<EngineConfig>) -> Result<Self> {
        Ok(Self::for_endpoint(spec.endpoint()?, config))
    }

    pub fn endpoint_type(&self) -> EndpointType {
        match self {
            FaultBuilder::Linux(_) => EndpointType::Linux,
            FaultBuilder::Kubernetes(_) => EndpointType::Kubernetes,
            FaultBuilder::Docker(_) => EndpointType::Docker,
            FaultBuilder::Hypervisor(_) => EndpointType::Hypervisor,
        }
    }

    fn supports(&self, fault: FaultName) -> bool {
        match (self, fault.family()) {
            (_, FaultFamily::Agent) => !matches!(self, FaultBuilder::Hypervisor(_)),
            (FaultBuilder::Kubernetes(_), FaultFamily::KubernetesResource) => true,
            (FaultBuilder::Docker(_), FaultFamily::ContainerState) => true,
            (FaultBuilder::Hypervisor(_), FaultFamily::Hypervisor) => true,
            _ => false,
        }
    }

    /// Obtain the executor for the fault's endpoint
    pub fn executor_for(
        &self,
        spec: &FaultSpec,
        factory: &dyn EndpointClientFactory,
    ) -> Result<Arc<dyn RemoteExecutor>> {
        factory.executor_for(&EndpointRef {
            name: spec.endpoint_name.clone(),
            endpoint_type: self.endpoint_type(),
        })
    }

    /// Resolve the fault name and its concrete targets
    ///
    /// `seed` holds properties persisted by the injection; for remediation and
    /// status they pin the targets the injection actually hit.
    pub async fn resolve(
        &self,
        spec: &FaultSpec,
        operation: FaultOperation,
        executor: &dyn RemoteExecutor,
        seed: &PropertyBag,
    ) -> Result<ResolvedFault> {
        let fault = spec.fault()?;
        if !self.supports(fault) {
            return Err(DomainError::UnsupportedFault {
                fault: fault.to_string(),
                endpoint: self.endpoint_type().to_string(),
            }
            .into());
        }

        let resources = match self {
            FaultBuilder::Linux(b) => b.resolve_targets(spec)?,
            FaultBuilder::Kubernetes(b) => {
                b.resolve_targets(spec, operation, executor, seed).await?
            }
            FaultBuilder::Docker(b) => b.resolve_targets(spec)?,
            FaultBuilder::Hypervisor(b) => b.resolve_targets(spec)?,
        };

        Ok(ResolvedFault::new(spec.clone(), fault, resources).with_properties(seed.clone()))
    }

    pub fn build_injection(&self, fault: &ResolvedFault) -> Result<Sequence> {
        self.build(fault, FaultOperation::Inject)
    }

    pub fn build_remediation(&self, fault: &ResolvedFault) -> Result<Sequence> {
        self.build(fault, FaultOperation::Remediate)
    }

    pub fn build_status(&self, fault: &ResolvedFault) -> Result<Sequence> {
        self.build(fault, FaultOperation::Status)
    }

    pub fn build(&self, fault: &ResolvedFault, operation: FaultOperation) -> Result<Sequence> {
        match self {
            FaultBuilder::Linux(b) => b.build(fault, operation),
            FaultBuilder::Kubernetes(b) => b.build(fault, operation),
            FaultBuilder::Docker(b) => b.build(fault, operation),
            FaultBuilder::Hypervisor(b) => b.build(fault, operation),
        }
    }
}

/// Agent directory for host-like targets: the fault's injection home, else the configured base
fn agent_base(spec: &FaultSpec, config: &EngineConfig) -> String {
    normalize_base_path(
        spec.injection_home_dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or(&config.script_base_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FaultTarget;
    use crate::error::ErrorKind;
    use crate::port::remote_executor::mocks::ScriptedExecutor;
    use std::collections::BTreeMap;

    fn host_spec(fault: &str, endpoint: &str) -> FaultSpec {
        FaultSpec {
            run_id: "run-1".to_string(),
            fault_name: fault.to_string(),
            args: BTreeMap::new(),
            endpoint_type: endpoint.to_string(),
            endpoint_name: "ep".to_string(),
            injection_home_dir: None,
            target: FaultTarget::Host {
                host: "10.0.0.1".to_string(),
            },
            timeout_ms: 60_000,
            random_injection: false,
        }
    }

    #[test]
    fn test_unknown_endpoint_type_is_rejected() {
        let spec = host_spec("cpu", "MAINFRAME");
        let err = FaultBuilder::for_spec(&spec, Arc::new(EngineConfig::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedEndpoint);
    }

    #[tokio::test]
    async fn test_unknown_fault_is_rejected_without_calls() {
        let spec = host_spec("gravity-inversion", "LINUX");
        let builder = FaultBuilder::for_spec(&spec, Arc::new(EngineConfig::default())).unwrap();
        let remote = ScriptedExecutor::new();

        let err = builder
            .resolve(&spec, FaultOperation::Inject, &remote, &PropertyBag::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownFault);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_family_mismatch_is_unsupported() {
        let spec = host_spec("vm-power-off", "LINUX");
        let builder = FaultBuilder::for_spec(&spec, Arc::new(EngineConfig::default())).unwrap();
        let err = builder
            .resolve(&spec, FaultOperation::Inject, &ScriptedExecutor::new(), &PropertyBag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedEndpoint);
    }

    #[test]
    fn test_agent_base_prefers_injection_home() {
        let config = EngineConfig::default();
        let mut spec = host_spec("cpu", "LINUX");
        assert_eq!(agent_base(&spec, &config), config.script_base_path);

        spec.injection_home_dir = Some("/home/chaos".to_string());
        assert_eq!(agent_base(&spec, &config), "/home/chaos/");
    }
}
