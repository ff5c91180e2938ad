// Fault Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Endpoint family a fault is executed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointType {
    Linux,
    Kubernetes,
    Docker,
    Hypervisor,
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointType::Linux => write!(f, "LINUX"),
            EndpointType::Kubernetes => write!(f, "KUBERNETES"),
            EndpointType::Docker => write!(f, "DOCKER"),
            EndpointType::Hypervisor => write!(f, "HYPERVISOR"),
        }
    }
}

impl FromStr for EndpointType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LINUX" | "MACHINE" => Ok(EndpointType::Linux),
            "KUBERNETES" | "K8S" | "K8S_CLUSTER" => Ok(EndpointType::Kubernetes),
            "DOCKER" => Ok(EndpointType::Docker),
            "HYPERVISOR" | "VCENTER" => Ok(EndpointType::Hypervisor),
            _ => Err(DomainError::UnknownEndpointType(s.to_string())),
        }
    }
}

/// Operation a fault run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultOperation {
    Inject,
    Remediate,
    Status,
}

impl FaultOperation {
    /// Operation name understood by the injection agent
    pub fn agent_operation(&self) -> &'static str {
        match self {
            FaultOperation::Inject => "inject",
            FaultOperation::Remediate => "remediate",
            FaultOperation::Status => "status",
        }
    }
}

impl std::fmt::Display for FaultOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultOperation::Inject => write!(f, "INJECT"),
            FaultOperation::Remediate => write!(f, "REMEDIATE"),
            FaultOperation::Status => write!(f, "STATUS"),
        }
    }
}

/// How a fault is realised on its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultFamily {
    /// Runs through the injection agent's command grammar (hosts, pods, containers)
    Agent,
    /// Mutates Kubernetes objects directly
    KubernetesResource,
    /// Changes a container's runtime state
    ContainerState,
    /// Asynchronous operation on the hypervisor control plane
    Hypervisor,
}

/// Known fault enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultName {
    // Agent faults
    Cpu,
    Memory,
    DiskIo,
    DiskSpace,
    NetworkDelay,
    NetworkPacketLoss,
    NetworkPacketCorruption,
    NetworkPacketDuplication,
    FileHandlerLeak,
    KillProcess,
    KernelPanic,
    // Kubernetes resource faults
    DeleteResource,
    ResourceNotReady,
    ServiceUnavailable,
    // Container state faults
    ContainerStop,
    ContainerPause,
    // Hypervisor faults
    VmPowerOff,
    VmSuspend,
    VmNicDisconnect,
    VmDiskDisconnect,
    HostDisconnect,
}

const ALL_FAULTS: [FaultName; 21] = [
    FaultName::Cpu,
    FaultName::Memory,
    FaultName::DiskIo,
    FaultName::DiskSpace,
    FaultName::NetworkDelay,
    FaultName::NetworkPacketLoss,
    FaultName::NetworkPacketCorruption,
    FaultName::NetworkPacketDuplication,
    FaultName::FileHandlerLeak,
    FaultName::KillProcess,
    FaultName::KernelPanic,
    FaultName::DeleteResource,
    FaultName::ResourceNotReady,
    FaultName::ServiceUnavailable,
    FaultName::ContainerStop,
    FaultName::ContainerPause,
    FaultName::VmPowerOff,
    FaultName::VmSuspend,
    FaultName::VmNicDisconnect,
    FaultName::VmDiskDisconnect,
    FaultName::HostDisconnect,
];

impl FaultName {
    pub fn all() -> &'static [FaultName] {
        &ALL_FAULTS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultName::Cpu => "cpu",
            FaultName::Memory => "memory",
            FaultName::DiskIo => "disk-io",
            FaultName::DiskSpace => "disk-space",
            FaultName::NetworkDelay => "network-delay",
            FaultName::NetworkPacketLoss => "network-packet-loss",
            FaultName::NetworkPacketCorruption => "network-packet-corruption",
            FaultName::NetworkPacketDuplication => "network-packet-duplication",
            FaultName::FileHandlerLeak => "file-handler-leak",
            FaultName::KillProcess => "kill-process",
            FaultName::KernelPanic => "kernel-panic",
            FaultName::DeleteResource => "delete-resource",
            FaultName::ResourceNotReady => "resource-not-ready",
            FaultName::ServiceUnavailable => "service-unavailable",
            FaultName::ContainerStop => "container-stop",
            FaultName::ContainerPause => "container-pause",
            FaultName::VmPowerOff => "vm-power-off",
            FaultName::VmSuspend => "vm-suspend",
            FaultName::VmNicDisconnect => "vm-nic-disconnect",
            FaultName::VmDiskDisconnect => "vm-disk-disconnect",
            FaultName::HostDisconnect => "host-disconnect",
        }
    }

    pub fn family(&self) -> FaultFamily {
        match self {
            FaultName::DeleteResource
            | FaultName::ResourceNotReady
            | FaultName::ServiceUnavailable => FaultFamily::KubernetesResource,
            FaultName::ContainerStop | FaultName::ContainerPause => FaultFamily::ContainerState,
            FaultName::VmPowerOff
            | FaultName::VmSuspend
            | FaultName::VmNicDisconnect
            | FaultName::VmDiskDisconnect
            | FaultName::HostDisconnect => FaultFamily::Hypervisor,
            _ => FaultFamily::Agent,
        }
    }

    /// Faults whose effect cannot be reversed by a follow-up command
    pub fn remediation_unsupported(&self) -> bool {
        matches!(self, FaultName::FileHandlerLeak | FaultName::KernelPanic)
    }
}

impl std::fmt::Display for FaultName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ALL_FAULTS
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::UnknownFault(s.to_string()))
    }
}

/// Target-specific addressing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FaultTarget {
    Host {
        host: String,
    },
    Kubernetes {
        namespace: String,
        #[serde(default = "default_resource_type")]
        resource_type: String,
        #[serde(default)]
        resource_names: Vec<String>,
        #[serde(default)]
        resource_labels: BTreeMap<String, String>,
        #[serde(default)]
        container: Option<String>,
    },
    Docker {
        container: String,
    },
    Hypervisor {
        resource_id: String,
    },
}

fn default_resource_type() -> String {
    "pod".to_string()
}

/// Fault specification (read-only input produced by the service layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSpec {
    /// Key under which extracted properties are persisted between runs
    pub run_id: String,
    pub fault_name: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    pub endpoint_type: String,
    pub endpoint_name: String,
    #[serde(default)]
    pub injection_home_dir: Option<String>,
    pub target: FaultTarget,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub random_injection: bool,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl FaultSpec {
    /// Resolve the fault name, failing fast on unknown names
    pub fn fault(&self) -> Result<FaultName> {
        self.fault_name.parse()
    }

    pub fn endpoint(&self) -> Result<EndpointType> {
        self.endpoint_type.parse()
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn required_arg(&self, name: &str) -> Result<&str> {
        self.arg(name).ok_or_else(|| {
            DomainError::ValidationError(format!(
                "missing required argument '{}' for fault '{}'",
                name, self.fault_name
            ))
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_ms.div_ceil(1000)
    }

    /// Copy of this spec narrowed to a single Kubernetes resource (fan-out child)
    pub fn narrowed_to(&self, resource: &str) -> FaultSpec {
        let mut child = self.clone();
        child.run_id = format!("{}/{}", self.run_id, resource);
        child.random_injection = false;
        if let FaultTarget::Kubernetes {
            resource_names,
            resource_labels,
            ..
        } = &mut child.target
        {
            *resource_names = vec![resource.to_string()];
            resource_labels.clear();
        }
        child
    }
}
