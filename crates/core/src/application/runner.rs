// Fault Runner - task lifecycle around one fault operation
//
// PENDING -> IN_PROGRESS -> COMPLETED | FAILED
// Build errors fail the run before anything is dispatched. Injection persists
// the extracted properties so remediation can replay them later.

use crate::application::aggregator::{AggregateReport, ChildTaskAggregator};
use crate::application::builders::{FaultBuilder, ResolvedFault};
use crate::application::cancel::CancelToken;
use crate::application::constants::RESOLVED_TARGETS_PROPERTY;
use crate::application::known_failures;
use crate::application::sequence::{SequenceExecutor, SequenceResult};
use crate::config::EngineConfig;
use crate::domain::{
    ChildTaskView, FaultOperation, FaultRun, FaultSpec, PropertyBag, Sequence, TaskHandle,
    TaskStatus,
};
use crate::error::{ErrorKind, OrchestrationError, Result};
use crate::port::{
    ChildTaskSource, EndpointClientFactory, FaultMetadataStore, RemoteExecutor, TaskSink,
    TimeProvider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Outcome of one fault run
#[derive(Debug, Clone)]
pub struct FaultRunReport {
    pub run: FaultRun,
    pub resources: Vec<String>,
    pub sequence: Option<SequenceResult>,
    pub error_kind: Option<ErrorKind>,
    /// Present for fan-out runs
    pub children: Option<AggregateReport>,
}

impl FaultRunReport {
    pub fn status(&self) -> TaskStatus {
        self.run.status
    }

    fn new(run: FaultRun) -> Self {
        Self {
            run,
            resources: Vec::new(),
            sequence: None,
            error_kind: None,
            children: None,
        }
    }
}

/// Everything needed to execute one operation, produced without remote mutation
struct Prepared {
    resolved: ResolvedFault,
    sequence: Sequence,
    executor: Arc<dyn RemoteExecutor>,
}

/// Fault runner
#[derive(Clone)]
pub struct FaultRunner {
    config: Arc<EngineConfig>,
    endpoints: Arc<dyn EndpointClientFactory>,
    metadata: Arc<dyn FaultMetadataStore>,
    clock: Arc<dyn TimeProvider>,
}

impl FaultRunner {
    pub fn new(
        config: Arc<EngineConfig>,
        endpoints: Arc<dyn EndpointClientFactory>,
        metadata: Arc<dyn FaultMetadataStore>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            endpoints,
            metadata,
            clock,
        }
    }

    /// Run one operation for one fault spec
    ///
    /// Failures of the fault itself are reported through `sink` and the
    /// returned report; `Err` is reserved for lifecycle violations.
    pub async fn run(
        &self,
        operation: FaultOperation,
        spec: &FaultSpec,
        sink: Arc<dyn TaskSink>,
        cancel: CancelToken,
    ) -> Result<FaultRunReport> {
        let mut report = FaultRunReport::new(FaultRun::new(spec.run_id.clone(), operation));
        report.run.start(self.clock.now_millis())?;
        sink.update_task_status(TaskStatus::InProgress).await;
        info!(
            run_id = %spec.run_id,
            fault = %spec.fault_name,
            endpoint = %spec.endpoint_name,
            operation = %operation,
            "Fault run started"
        );

        let prepared = match self.prepare(operation, spec).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(run_id = %spec.run_id, kind = %e.kind(), error = %e, "Fault run rejected before dispatch");
                self.finish_failed(&mut report, sink.as_ref(), e.kind(), e.to_string())
                    .await?;
                return Ok(report);
            }
        };
        report.resources = prepared.resolved.resources.clone();

        if prepared.sequence.is_empty() {
            let line = match operation {
                FaultOperation::Remediate => {
                    format!("remediation not applicable for {}", prepared.resolved.fault)
                }
                _ => format!("nothing to run for {} {}", operation, prepared.resolved.fault),
            };
            sink.update_task_output(&line).await;
            report.sequence = Some(SequenceResult::empty());
            return self.finish_completed(report, sink.as_ref()).await;
        }

        let executed = SequenceExecutor::new(cancel)
            .execute_seeded(
                &prepared.sequence,
                prepared.executor.as_ref(),
                &prepared.resolved.properties,
            )
            .await;

        let result = match executed {
            Ok(result) => result,
            Err(e) => {
                self.finish_failed(&mut report, sink.as_ref(), e.kind(), e.to_string())
                    .await?;
                return Ok(report);
            }
        };

        for message in &result.messages {
            sink.update_task_output(message).await;
        }

        if let Some(failure) = &result.failure {
            let (kind, message) = (failure.kind, failure.message.clone());
            // Applied side effects stay in place; remediation needs what was captured
            let captured = !result.properties.is_empty() || spec.random_injection;
            if operation == FaultOperation::Inject && result.dispatched > 0 && captured {
                if let Err(e) = self.persist(&prepared.resolved, &result).await {
                    error!(run_id = %spec.run_id, error = %e, "Failed to persist metadata of partial injection");
                }
            }
            report.sequence = Some(result);
            self.finish_failed(&mut report, sink.as_ref(), kind, message)
                .await?;
            return Ok(report);
        }

        if operation == FaultOperation::Inject {
            if let Err(e) = self.persist(&prepared.resolved, &result).await {
                error!(run_id = %spec.run_id, error = %e, "Failed to persist fault metadata");
                report.sequence = Some(result);
                self.finish_failed(&mut report, sink.as_ref(), e.kind(), e.to_string())
                    .await?;
                return Ok(report);
            }
        }

        sink.update_task_output(&format!(
            "{} {} succeeded on {}",
            operation,
            prepared.resolved.fault,
            prepared.resolved.resources.join(", ")
        ))
        .await;
        report.sequence = Some(result);
        self.finish_completed(report, sink.as_ref()).await
    }

    async fn prepare(&self, operation: FaultOperation, spec: &FaultSpec) -> Result<Prepared> {
        // Unknown fault names are rejected before any endpoint is touched
        spec.fault()?;
        known_failures::catalog()?;
        let builder = FaultBuilder::for_spec(spec, self.config.clone())?;
        let executor = builder.executor_for(spec, self.endpoints.as_ref())?;

        let seed = match operation {
            FaultOperation::Inject => PropertyBag::new(),
            FaultOperation::Remediate | FaultOperation::Status => {
                self.metadata.load(&spec.run_id).await?
            }
        };

        let resolved = builder
            .resolve(spec, operation, executor.as_ref(), &seed)
            .await?;
        let sequence = builder.build(&resolved, operation)?;
        info!(
            run_id = %spec.run_id,
            descriptors = sequence.len(),
            resources = ?resolved.resources,
            "Sequence built"
        );

        Ok(Prepared {
            resolved,
            sequence,
            executor,
        })
    }

    async fn persist(&self, resolved: &ResolvedFault, result: &SequenceResult) -> Result<()> {
        let mut properties = result.properties.clone();
        properties.insert(
            RESOLVED_TARGETS_PROPERTY.to_string(),
            resolved.resources.join(","),
        );
        self.metadata.save(&resolved.spec.run_id, &properties).await
    }

    async fn finish_completed(
        &self,
        mut report: FaultRunReport,
        sink: &dyn TaskSink,
    ) -> Result<FaultRunReport> {
        report.run.complete(self.clock.now_millis())?;
        sink.update_task_status(TaskStatus::Completed).await;
        info!(run_id = %report.run.id, operation = %report.run.operation, "Fault run completed");
        Ok(report)
    }

    async fn finish_failed(
        &self,
        report: &mut FaultRunReport,
        sink: &dyn TaskSink,
        kind: ErrorKind,
        message: String,
    ) -> Result<()> {
        let reason = format!("[{}] {}", kind, message);
        report.run.fail(reason.clone(), self.clock.now_millis())?;
        report.error_kind = Some(kind);
        sink.update_task_failure_reason(&reason).await;
        sink.update_task_status(TaskStatus::Failed).await;
        warn!(run_id = %report.run.id, kind = %kind, "Fault run failed");
        Ok(())
    }

    /// Run one child per resolved resource and aggregate their outcomes
    ///
    /// Each child operates on `spec` narrowed to its resource and keeps its own
    /// metadata under `<run_id>/<resource>`.
    pub async fn run_fan_out(
        &self,
        operation: FaultOperation,
        spec: &FaultSpec,
        sink: Arc<dyn TaskSink>,
        cancel: CancelToken,
    ) -> Result<FaultRunReport> {
        let mut report = FaultRunReport::new(FaultRun::new(spec.run_id.clone(), operation));
        report.run.start(self.clock.now_millis())?;
        sink.update_task_status(TaskStatus::InProgress).await;

        let resources = match self.resolve_fan_out(operation, spec).await {
            Ok(resources) => resources,
            Err(e) => {
                self.finish_failed(&mut report, sink.as_ref(), e.kind(), e.to_string())
                    .await?;
                return Ok(report);
            }
        };

        if operation == FaultOperation::Inject {
            let pinned: PropertyBag = [(RESOLVED_TARGETS_PROPERTY.to_string(), resources.join(","))]
                .into_iter()
                .collect();
            if let Err(e) = self.metadata.save(&spec.run_id, &pinned).await {
                self.finish_failed(&mut report, sink.as_ref(), e.kind(), e.to_string())
                    .await?;
                return Ok(report);
            }
        }

        let registry = Arc::new(ChildRegistry::default());
        let mut handles = Vec::with_capacity(resources.len());
        let mut joins = Vec::with_capacity(resources.len());
        for resource in &resources {
            let child_spec = spec.narrowed_to(resource);
            let handle = TaskHandle::new(child_spec.run_id.clone(), resource.clone());
            registry.register(&handle.id);

            let child_sink: Arc<dyn TaskSink> = Arc::new(ChildSink {
                registry: registry.clone(),
                id: handle.id.clone(),
            });
            let runner = self.clone();
            let child_cancel = cancel.clone();
            joins.push(tokio::spawn(async move {
                let id = child_spec.run_id.clone();
                if let Err(e) = runner
                    .run(operation, &child_spec, child_sink.clone(), child_cancel)
                    .await
                {
                    error!(task = %id, error = %e, "Child run aborted");
                    child_sink.update_task_failure_reason(&e.to_string()).await;
                    child_sink.update_task_status(TaskStatus::Failed).await;
                }
            }));
            handles.push(handle);
        }

        let aggregator = ChildTaskAggregator::new(registry, self.config.child_poll.into());
        let children = aggregator
            .await_children(handles, sink.as_ref(), &cancel)
            .await;

        for join in joins {
            if !join.is_finished() {
                join.abort();
            }
        }

        report.resources = resources;
        let status = children.status();
        report.children = Some(children);
        if status == TaskStatus::Completed {
            self.finish_completed(report, sink.as_ref()).await
        } else {
            let failed = report
                .children
                .as_ref()
                .map(|c| c.failed().count())
                .unwrap_or_default();
            self.finish_failed(
                &mut report,
                sink.as_ref(),
                ErrorKind::CommandFailed,
                format!("{} child task(s) did not complete", failed),
            )
            .await?;
            Ok(report)
        }
    }

    async fn resolve_fan_out(&self, operation: FaultOperation, spec: &FaultSpec) -> Result<Vec<String>> {
        spec.fault()?;
        let builder = FaultBuilder::for_spec(spec, self.config.clone())?;
        let executor = builder.executor_for(spec, self.endpoints.as_ref())?;
        let seed = match operation {
            FaultOperation::Inject => PropertyBag::new(),
            _ => self.metadata.load(&spec.run_id).await?,
        };
        let resolved = builder
            .resolve(spec, operation, executor.as_ref(), &seed)
            .await?;
        if resolved.resources.is_empty() {
            return Err(OrchestrationError::Validation(
                "fan-out resolved no resources".to_string(),
            ));
        }
        Ok(resolved.resources)
    }
}

/// In-process record of fan-out children, read by the aggregator
#[derive(Default)]
pub struct ChildRegistry {
    tasks: Mutex<HashMap<String, ChildTaskView>>,
}

impl ChildRegistry {
    fn register(&self, id: &str) {
        self.lock().insert(
            id.to_string(),
            ChildTaskView {
                id: id.to_string(),
                status: TaskStatus::Pending,
                failure_reason: None,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ChildTaskView>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChildTaskSource for ChildRegistry {
    async fn status(&self, child: &TaskHandle) -> Result<ChildTaskView> {
        self.lock()
            .get(&child.id)
            .cloned()
            .ok_or_else(|| OrchestrationError::Internal(format!("unknown child task {}", child.id)))
    }
}

/// Task sink of one fan-out child
struct ChildSink {
    registry: Arc<ChildRegistry>,
    id: String,
}

#[async_trait]
impl TaskSink for ChildSink {
    async fn update_task_output(&self, line: &str) {
        info!(task = %self.id, "{}", line);
    }

    async fn update_task_failure_reason(&self, reason: &str) {
        if let Some(view) = self.registry.lock().get_mut(&self.id) {
            view.failure_reason = Some(reason.to_string());
        }
    }

    async fn update_task_status(&self, status: TaskStatus) {
        if let Some(view) = self.registry.lock().get_mut(&self.id) {
            view.status = status;
        }
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
