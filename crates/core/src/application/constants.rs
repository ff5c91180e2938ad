// Engine constants (no magic values in builders)

/// Default agent location on Linux hosts
pub const DEFAULT_SCRIPT_BASE_PATH: &str = "/opt/chaos/infra_agent/";

/// Agent submission entry point
pub const DEFAULT_AGENT_BINARY: &str = "infra_submit";

/// Agent daemon start script
pub const DEFAULT_AGENT_START_BINARY: &str = "infra_agent";

/// Packaged agent archive copied into Kubernetes pods
pub const DEFAULT_K8S_AGENT_ARCHIVE: &str = "/opt/chaos/agents/infra_agent.tar.gz";

/// Directory the agent archive extracts into
pub const DEFAULT_K8S_AGENT_DIR: &str = "infra_agent";

/// Image that never becomes ready
pub const DEFAULT_NOT_READY_IMAGE: &str = "registry.invalid/chaos/not-ready:latest";

/// Readiness / endpoint convergence: 30 polls, 10s apart
pub const CONVERGENCE_MAX_ATTEMPTS: u32 = 30;
pub const CONVERGENCE_INTERVAL_SECS: u64 = 10;

/// Kubernetes agent submission retries
pub const AGENT_SUBMIT_RETRIES: u32 = 3;
pub const AGENT_SUBMIT_RETRY_INTERVAL_SECS: u64 = 5;

/// Hypervisor adapter task polling
pub const HYPERVISOR_POLL_INTERVAL_SECS: u64 = 5;
pub const HYPERVISOR_TIMEOUT_SECS: u64 = 600;

/// Marker reported by the adapter while an async task is still running
pub const HYPERVISOR_PENDING_MARKER: &str = "TRIGGERED";

/// Fan-out child polling: 10s x 360 = 1 hour per child
pub const CHILD_POLL_INTERVAL_SECS: u64 = 10;
pub const CHILD_MAX_POLLS: u32 = 360;

/// Metadata property recording the resources an injection actually targeted
pub const RESOLVED_TARGETS_PROPERTY: &str = "resolvedTargets";

/// Disk properties scraped at disconnect time and required for reconnect
pub const DISK_BACKING_PROPERTIES: [&str; 3] = ["type", "backingType", "backingVMDKFile"];

/// Directory inside a pod receiving the agent archive when none is configured
pub const DEFAULT_K8S_INJECTION_HOME: &str = "/tmp/";

/// Label stamped onto a service selector so it matches no pods
pub const SERVICE_UNAVAILABLE_SELECTOR_KEY: &str = "chaos-injected";
