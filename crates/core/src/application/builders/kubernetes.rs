// Kubernetes builder
//
// Agent faults run a four-phase pipeline per pod (copy, chmod, extract,
// start+submit). Resource faults mutate Kubernetes objects directly and poll
// until the cluster reflects the change.

use super::agent::agent_command;
use super::ResolvedFault;
use crate::application::constants::{
    DEFAULT_K8S_INJECTION_HOME, RESOLVED_TARGETS_PROPERTY, SERVICE_UNAVAILABLE_SELECTOR_KEY,
};
use crate::application::known_failures;
use crate::application::template::shell_quote;
use crate::config::{normalize_base_path, EngineConfig};
use crate::domain::{
    CommandDescriptor, FaultFamily, FaultName, FaultOperation, FaultSpec, FaultTarget,
    PropertyBag, Sequence,
};
use crate::error::{OrchestrationError, Result};
use crate::port::RemoteExecutor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const ENDPOINTS_TEMPLATE: &str = "{{if .subsets}}{{range .subsets}}{{if .addresses}}addresses {{end}}{{end}}{{else}}<no value>{{end}}";

/// Kubernetes addressing borrowed from a fault spec
struct KubeTarget<'a> {
    namespace: &'a str,
    resource_type: &'a str,
    names: &'a [String],
    labels: &'a BTreeMap<String, String>,
    container: Option<&'a str>,
}

impl<'a> KubeTarget<'a> {
    fn of(spec: &'a FaultSpec) -> Result<Self> {
        match &spec.target {
            FaultTarget::Kubernetes {
                namespace,
                resource_type,
                resource_names,
                resource_labels,
                container,
            } => {
                if namespace.trim().is_empty() {
                    return Err(OrchestrationError::Validation(
                        "kubernetes target needs a namespace".to_string(),
                    ));
                }
                Ok(Self {
                    namespace,
                    resource_type,
                    names: resource_names,
                    labels: resource_labels,
                    container: container.as_deref().filter(|c| !c.trim().is_empty()),
                })
            }
            other => Err(OrchestrationError::Validation(format!(
                "kubernetes faults need a kubernetes target, got {:?}",
                other
            ))),
        }
    }

    fn require_kind(&self, fault: FaultName, accepted: &[&str]) -> Result<()> {
        if accepted
            .iter()
            .any(|kind| kind.eq_ignore_ascii_case(self.resource_type))
        {
            return Ok(());
        }
        Err(OrchestrationError::Validation(format!(
            "fault '{}' cannot target resource type '{}'",
            fault, self.resource_type
        )))
    }

    fn container_flag(&self) -> String {
        self.container
            .map(|c| format!(" -c {}", c))
            .unwrap_or_default()
    }

    fn exec(&self, pod: &str, script: &str) -> String {
        format!(
            "kubectl exec {} -n {}{} -- /bin/sh -c {}",
            pod,
            self.namespace,
            self.container_flag(),
            shell_quote(script)
        )
    }
}

/// Pick the injection targets from the resolved candidates
///
/// With `random` set, exactly one candidate is chosen, reproducibly when
/// `seed` is given.
pub fn select_targets(mut candidates: Vec<String>, random: bool, seed: Option<u64>) -> Vec<String> {
    if !random || candidates.len() <= 1 {
        return candidates;
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let picked = rng.gen_range(0..candidates.len());
    vec![candidates.swap_remove(picked)]
}

#[derive(Debug, Clone)]
pub struct KubernetesBuilder {
    config: Arc<EngineConfig>,
}

impl KubernetesBuilder {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub(super) async fn resolve_targets(
        &self,
        spec: &FaultSpec,
        operation: FaultOperation,
        executor: &dyn RemoteExecutor,
        seed: &PropertyBag,
    ) -> Result<Vec<String>> {
        let target = KubeTarget::of(spec)?;

        // Later runs act on what the injection actually hit
        if operation != FaultOperation::Inject {
            if let Some(pinned) = seed.get(RESOLVED_TARGETS_PROPERTY) {
                let pinned: Vec<String> = pinned
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                if !pinned.is_empty() {
                    debug!(targets = ?pinned, "Using targets recorded at injection");
                    return Ok(pinned);
                }
            }
        }

        let candidates = if !target.names.is_empty() {
            self.resolve_names(&target, executor).await?
        } else if !target.labels.is_empty() {
            self.resolve_labels(&target, executor).await?
        } else {
            return Err(OrchestrationError::Validation(
                "kubernetes target needs resource names or labels".to_string(),
            ));
        };

        let random = spec.random_injection && operation == FaultOperation::Inject;
        let selected = select_targets(candidates, random, self.config.random_seed);
        info!(
            namespace = target.namespace,
            resource_type = target.resource_type,
            targets = ?selected,
            random,
            "Resolved kubernetes targets"
        );
        Ok(selected)
    }

    async fn resolve_names(
        &self,
        target: &KubeTarget<'_>,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<String>> {
        let mut resolved = Vec::with_capacity(target.names.len());
        for name in target.names {
            let command = format!(
                "kubectl get {} {} -n {} -o jsonpath='{{.metadata.name}}'",
                target.resource_type, name, target.namespace
            );
            let result = executor.execute(&command, None).await?;
            let found = result.raw_output.trim();
            if !result.is_zero_exit() || found.is_empty() {
                return Err(OrchestrationError::Validation(format!(
                    "cannot resolve {} '{}' in namespace '{}': {}",
                    target.resource_type, name, target.namespace, found
                )));
            }
            resolved.push(found.to_string());
        }
        Ok(resolved)
    }

    async fn resolve_labels(
        &self,
        target: &KubeTarget<'_>,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<String>> {
        let selector = target
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let command = format!(
            "kubectl get {} -n {} -l {} -o jsonpath='{{.items[*].metadata.name}}'",
            target.resource_type, target.namespace, selector
        );
        let result = executor.execute(&command, None).await?;
        let names: Vec<String> = if result.is_zero_exit() {
            result
                .raw_output
                .split_whitespace()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        if names.is_empty() {
            return Err(OrchestrationError::Validation(format!(
                "no {} matches labels '{}' in namespace '{}'",
                target.resource_type, selector, target.namespace
            )));
        }
        Ok(names)
    }

    pub(super) fn build(&self, resolved: &ResolvedFault, operation: FaultOperation) -> Result<Sequence> {
        let target = KubeTarget::of(&resolved.spec)?;
        let fault = resolved.fault;

        let mut sequence = Sequence::new();
        for resource in &resolved.resources {
            let part = match fault.family() {
                FaultFamily::Agent => {
                    target.require_kind(fault, &["pod", "pods"])?;
                    self.agent_fault(resolved, &target, resource, operation)?
                }
                FaultFamily::KubernetesResource => match fault {
                    FaultName::DeleteResource => self.delete_resource(resolved, &target, resource, operation),
                    FaultName::ResourceNotReady => {
                        target.require_kind(fault, &["pod", "pods"])?;
                        self.resource_not_ready(&target, resource, operation)?
                    }
                    FaultName::ServiceUnavailable => {
                        target.require_kind(fault, &["service", "services", "svc"])?;
                        self.service_unavailable(resolved, &target, resource, operation)
                    }
                    _ => Sequence::new(),
                },
                _ => {
                    return Err(OrchestrationError::Internal(format!(
                        "'{}' is not a kubernetes fault",
                        fault
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
        target: &KubeTarget<'_>,
        pod: &str,
        operation: FaultOperation,
    ) -> Result<Sequence> {
        let spec = &resolved.spec;
        let fault = resolved.fault;
        let home = normalize_base_path(
            spec.injection_home_dir
                .as_deref()
                .filter(|dir| !dir.trim().is_empty())
                .unwrap_or(DEFAULT_K8S_INJECTION_HOME),
        );
        let agent_dir = normalize_base_path(&format!("{}{}", home, self.config.k8s_agent_dir));

        match operation {
            FaultOperation::Inject => {
                let archive = &self.config.k8s_agent_archive;
                let file = Path::new(archive)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        OrchestrationError::Config(format!("agent archive '{}' has no file name", archive))
                    })?;
                let submit = agent_command(&agent_dir, &self.config.agent_binary, spec, fault, operation)?;

                Ok(vec![
                    CommandDescriptor::new(format!(
                        "kubectl cp {} {}/{}:{}{}{}",
                        archive,
                        target.namespace,
                        pod,
                        home,
                        file,
                        target.container_flag()
                    ))
                    .described(format!("Copy agent archive to {}/{}", target.namespace, pod))
                    .known_failures(known_failures::table("kubernetes.copy")),
                    CommandDescriptor::new(format!(
                        "kubectl exec {} -n {}{} -- chmod 755 {}{}",
                        pod,
                        target.namespace,
                        target.container_flag(),
                        home,
                        file
                    ))
                    .described(format!("Make agent archive accessible in {}", pod))
                    .known_failures(known_failures::table("kubernetes.chmod")),
                    CommandDescriptor::new(
                        target.exec(pod, &format!("cd {} && tar -zxvf {}", home, file)),
                    )
                    .described(format!("Extract agent in {}", pod))
                    .known_failures(known_failures::table("kubernetes.extract")),
                    CommandDescriptor::new(target.exec(
                        pod,
                        &format!(
                            "cd {} && (./{} || true) && {}",
                            agent_dir, self.config.agent_start_binary, submit
                        ),
                    ))
                    .described(format!("Start agent and submit {} in {}", fault, pod))
                    .known_failures(known_failures::table("kubernetes.submit"))
                    .retry(
                        self.config.agent_submit_retries,
                        self.config.agent_submit_retry_interval_secs,
                    )
                    .timeout(spec.timeout_secs()),
                ])
            }
            FaultOperation::Remediate if fault.remediation_unsupported() => Ok(Sequence::new()),
            FaultOperation::Remediate if fault == FaultName::KillProcess => {
                Ok(match spec.arg("remediationCommand") {
                    Some(command) => vec![CommandDescriptor::new(target.exec(pod, command))
                        .described(format!("Run remediation command in {}", pod))
                        .timeout(spec.timeout_secs())],
                    None => Sequence::new(),
                })
            }
            FaultOperation::Remediate | FaultOperation::Status => {
                let command = agent_command(&agent_dir, &self.config.agent_binary, spec, fault, operation)?;
                let table = format!("kubernetes.{}", operation.agent_operation());
                Ok(vec![CommandDescriptor::new(target.exec(pod, &command))
                    .described(format!("{} {} fault in {}", operation.agent_operation(), fault, pod))
                    .known_failures(known_failures::table(&table))
                    .timeout(spec.timeout_secs())])
            }
        }
    }

    fn delete_resource(
        &self,
        resolved: &ResolvedFault,
        target: &KubeTarget<'_>,
        name: &str,
        operation: FaultOperation,
    ) -> Sequence {
        match operation {
            FaultOperation::Inject => vec![CommandDescriptor::new(format!(
                "kubectl delete {} {} -n {}",
                target.resource_type, name, target.namespace
            ))
            .described(format!("Delete {} {}/{}", target.resource_type, target.namespace, name))
            .known_failures(known_failures::table("kubernetes.delete"))
            .timeout(resolved.spec.timeout_secs())],
            // Controllers recreate deleted resources; nothing to undo or query
            FaultOperation::Remediate | FaultOperation::Status => Sequence::new(),
        }
    }

    /// Poll a condition with the configured convergence cadence
    fn converge(&self, descriptor: CommandDescriptor) -> CommandDescriptor {
        let settings = self.config.convergence;
        descriptor.converging(settings.max_attempts, settings.interval_secs)
    }

    fn resource_not_ready(
        &self,
        target: &KubeTarget<'_>,
        pod: &str,
        operation: FaultOperation,
    ) -> Result<Sequence> {
        let container = target.container.ok_or_else(|| {
            OrchestrationError::Validation("resource-not-ready needs a container name".to_string())
        })?;
        let ns = target.namespace;
        let ready_query = format!(
            "kubectl get pod {} -n {} -o jsonpath='{{.status.containerStatuses[?(@.name==\"{}\")].ready}}'",
            pod, ns, container
        );
        let image_property = format!("originalImage.{}", pod);
        let patch_image = |image: &str| {
            let patch = serde_json::json!({
                "spec": { "containers": [{ "name": container, "image": image }] }
            });
            format!("kubectl patch pod {} -n {} -p {}", pod, ns, shell_quote(&patch.to_string()))
        };

        Ok(match operation {
            FaultOperation::Inject => vec![
                // Fail fast: without a readiness probe the pod never turns unready
                CommandDescriptor::new(format!(
                    "kubectl get pod {} -n {} -o jsonpath='{{.spec.containers[?(@.name==\"{c}\")].image}}{{\" \"}}{{.spec.containers[?(@.name==\"{c}\")].readinessProbe}}'",
                    pod,
                    ns,
                    c = container
                ))
                .described(format!("Check readiness probe of {}/{}", pod, container))
                .expect_output(r"^\S+ \{.+\}")
                .extract(image_property.as_str(), r"^(\S+)"),
                CommandDescriptor::new(patch_image(&self.config.not_ready_image))
                    .described(format!("Patch {}/{} with a never-ready image", pod, container)),
                self.converge(
                    CommandDescriptor::new(ready_query)
                        .described(format!("Wait for {}/{} to become unready", pod, container))
                        .expect_output(r"^\s*false\s*$"),
                ),
            ],
            FaultOperation::Remediate => vec![
                CommandDescriptor::new(patch_image(&format!("${{{}}}", image_property)))
                    .described(format!("Restore original image of {}/{}", pod, container)),
                self.converge(
                    CommandDescriptor::new(ready_query)
                        .described(format!("Wait for {}/{} to become ready", pod, container))
                        .expect_output(r"^\s*true\s*$"),
                ),
            ],
            FaultOperation::Status => vec![CommandDescriptor::new(ready_query)
                .described(format!("Query readiness of {}/{}", pod, container))],
        })
    }

    fn service_unavailable(
        &self,
        resolved: &ResolvedFault,
        target: &KubeTarget<'_>,
        service: &str,
        operation: FaultOperation,
    ) -> Sequence {
        let ns = target.namespace;
        let endpoints_query = format!(
            "kubectl get endpoints {} -n {} -o go-template='{}'",
            service, ns, ENDPOINTS_TEMPLATE
        );
        let selector_property = format!("originalSelector.{}", service);

        match operation {
            FaultOperation::Inject => {
                let patch = serde_json::json!({
                    "spec": { "selector": { SERVICE_UNAVAILABLE_SELECTOR_KEY: resolved.spec.run_id } }
                });
                vec![
                    CommandDescriptor::new(format!(
                        "kubectl get service {} -n {} -o jsonpath='{{.spec.selector}}'",
                        service, ns
                    ))
                    .described(format!("Capture selector of service {}", service))
                    .expect_output(r"\{.*\}")
                    .extract(selector_property.as_str(), r"(\{.*\})"),
                    CommandDescriptor::new(format!(
                        "kubectl patch service {} -n {} --type merge -p {}",
                        service,
                        ns,
                        shell_quote(&patch.to_string())
                    ))
                    .described(format!("Point service {} at no pods", service)),
                    self.converge(
                        CommandDescriptor::new(endpoints_query)
                            .described(format!("Wait for service {} to lose its endpoints", service))
                            .expect_output(r"^(\s|<no value>)*$"),
                    ),
                ]
            }
            FaultOperation::Remediate => vec![
                CommandDescriptor::new(format!(
                    "kubectl patch service {} -n {} --type json -p '[{{\"op\":\"replace\",\"path\":\"/spec/selector\",\"value\":${{{}}}}}]'",
                    service, ns, selector_property
                ))
                .described(format!("Restore selector of service {}", service)),
                self.converge(
                    CommandDescriptor::new(endpoints_query)
                        .described(format!("Wait for service {} to regain endpoints", service))
                        .expect_output("addresses"),
                ),
            ],
            FaultOperation::Status => vec![CommandDescriptor::new(endpoints_query)
                .described(format!("Query endpoints of service {}", service))],
        }
    }
}

#[cfg(test)]
#[path = "kubernetes_test.rs"]
mod tests;
