// Multi-Child Task Aggregator
//
// A fan-out fault runs one child task per resource. The parent sweeps every
// still-pending child concurrently on a fixed cadence and reports each child
// once, as soon as it reaches a terminal state.

use crate::application::cancel::CancelToken;
use crate::application::poller::{poll_until, PollPolicy, PollResult, PollStep};
use crate::domain::{TaskHandle, TaskStatus};
use crate::port::{ChildTaskSource, TaskSink};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Outcome reported for children that never reached a terminal state
pub const NOT_CONVERGED_OUTCOME: &str = "NOT_CONVERGED";

/// Final state of one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildOutcome {
    pub handle: TaskHandle,
    pub status: TaskStatus,
    /// False when the child was still running at the bound (or cancellation)
    pub converged: bool,
    pub failure_reason: Option<String>,
}

/// Aggregated result over all children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateReport {
    /// In the order children reached a terminal state
    pub outcomes: Vec<ChildOutcome>,
    pub sweeps: u32,
    pub cancelled: bool,
}

impl AggregateReport {
    /// Parent status: completed only if every child completed
    pub fn status(&self) -> TaskStatus {
        if self.outcomes.iter().all(|o| o.status == TaskStatus::Completed) {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChildOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != TaskStatus::Completed)
    }
}

#[derive(Default)]
struct SweepState {
    pending: Vec<TaskHandle>,
    outcomes: Vec<ChildOutcome>,
}

/// Child task aggregator
pub struct ChildTaskAggregator {
    source: Arc<dyn ChildTaskSource>,
    policy: PollPolicy,
}

impl ChildTaskAggregator {
    pub fn new(source: Arc<dyn ChildTaskSource>, policy: PollPolicy) -> Self {
        Self { source, policy }
    }

    /// Poll `children` until all are terminal, the bound is hit, or `cancel` fires
    pub async fn await_children(
        &self,
        children: Vec<TaskHandle>,
        sink: &dyn TaskSink,
        cancel: &CancelToken,
    ) -> AggregateReport {
        if children.is_empty() {
            return AggregateReport {
                outcomes: Vec::new(),
                sweeps: 0,
                cancelled: false,
            };
        }

        info!(
            children = children.len(),
            max_sweeps = self.policy.max_attempts,
            interval_secs = self.policy.interval.as_secs(),
            "Waiting for child tasks"
        );

        let state = Mutex::new(SweepState {
            pending: children,
            outcomes: Vec::new(),
        });
        let source = self.source.as_ref();

        let result = poll_until(self.policy, cancel, |sweep| {
            let state = &state;
            async move {
                let pending = lock(state).pending.clone();
                let views = join_all(pending.iter().map(|child| source.status(child))).await;

                let mut finished = Vec::new();
                let mut still_pending = Vec::new();
                for (child, view) in pending.into_iter().zip(views) {
                    match view {
                        Ok(view) if view.status.is_terminal() => finished.push(ChildOutcome {
                            handle: child,
                            status: view.status,
                            converged: true,
                            failure_reason: view.failure_reason,
                        }),
                        Ok(_) => still_pending.push(child),
                        Err(e) => {
                            // A lookup failure is not terminal; ask again next sweep
                            warn!(task = %child.id, sweep, error = %e, "Child status lookup failed");
                            still_pending.push(child);
                        }
                    }
                }

                for outcome in &finished {
                    publish(sink, outcome).await;
                }

                let mut guard = lock(state);
                guard.outcomes.extend(finished);
                guard.pending = still_pending;
                if guard.pending.is_empty() {
                    PollStep::Converged(())
                } else {
                    PollStep::Pending(())
                }
            }
        })
        .await;

        let sweeps = result.attempts();
        let cancelled = matches!(result, PollResult::Cancelled { .. });
        let SweepState {
            pending,
            mut outcomes,
        } = state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());

        for handle in pending {
            let reason = if cancelled {
                format!("child task {} for {} was abandoned on cancellation", handle.id, handle.resource)
            } else {
                format!(
                    "child task {} for {} did not finish within {} polls",
                    handle.id, handle.resource, sweeps
                )
            };
            let outcome = ChildOutcome {
                handle,
                status: TaskStatus::Failed,
                converged: false,
                failure_reason: Some(reason),
            };
            publish(sink, &outcome).await;
            outcomes.push(outcome);
        }

        let report = AggregateReport {
            outcomes,
            sweeps,
            cancelled,
        };
        info!(
            sweeps,
            failed = report.failed().count(),
            status = %report.status(),
            "Child tasks settled"
        );
        report
    }
}

fn lock(state: &Mutex<SweepState>) -> std::sync::MutexGuard<'_, SweepState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn publish(sink: &dyn TaskSink, outcome: &ChildOutcome) {
    let label = if outcome.converged {
        outcome.status.to_string()
    } else {
        NOT_CONVERGED_OUTCOME.to_string()
    };
    sink.update_task_output(&format!(
        "resource={} outcome={} task={}",
        outcome.handle.resource, label, outcome.handle.id
    ))
    .await;
    if outcome.status == TaskStatus::Failed {
        let reason = outcome
            .failure_reason
            .as_deref()
            .unwrap_or("child task failed without a reason");
        sink.update_task_failure_reason(&format!("{}: {}", outcome.handle.resource, reason))
            .await;
    }
}
