// Command Sequence Executor
//
// Runs an ordered list of descriptors against one executor. Descriptors are
// strictly sequential: N+1 never starts before N has succeeded (retries
// included). The first descriptor that exhausts its attempts short-circuits
// the rest of the sequence.

use crate::application::cancel::CancelToken;
use crate::application::classifier::{classify, Classification};
use crate::application::extractor::{compile_all, extract};
use crate::application::poller::{poll_until, PollPolicy, PollResult, PollStep};
use crate::application::template;
use crate::domain::{AsyncTaskPolicy, CommandDescriptor, CommandResult, PropertyBag};
use crate::error::{ErrorKind, Result};
use crate::port::{ExecutionError, RemoteExecutor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Longest slice of raw output quoted in failure messages
const MAX_OUTPUT_IN_MESSAGE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceStatus {
    Succeeded,
    Failed,
}

/// Why a sequence stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFailure {
    pub kind: ErrorKind,
    pub descriptor_index: usize,
    pub command: String,
    pub exit_code: Option<i32>,
    pub raw_output: String,
    pub message: String,
}

/// Aggregate outcome of one sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResult {
    pub status: SequenceStatus,
    /// Properties extracted during this run (seed properties excluded)
    pub properties: PropertyBag,
    /// Operator-visible messages from benign known failures, in order
    pub messages: Vec<String>,
    /// Executor calls made (attempts and status polls)
    pub dispatched: usize,
    pub failure: Option<SequenceFailure>,
}

impl SequenceResult {
    pub fn is_success(&self) -> bool {
        self.status == SequenceStatus::Succeeded
    }

    /// Result of a sequence with no descriptors
    pub fn empty() -> Self {
        Self {
            status: SequenceStatus::Succeeded,
            properties: PropertyBag::new(),
            messages: Vec::new(),
            dispatched: 0,
            failure: None,
        }
    }
}

/// Per-attempt judgement
#[derive(Debug)]
enum Verdict {
    Passed(CommandResult),
    Benign(CommandResult, Option<String>),
    Failed(CommandResult),
    Unreachable(String),
    Rejected(String),
}

enum DescriptorOutcome {
    Succeeded {
        properties: PropertyBag,
        message: Option<String>,
    },
    Failed(SequenceFailure),
}

/// Sequence executor
pub struct SequenceExecutor {
    cancel: CancelToken,
}

impl SequenceExecutor {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Execute a sequence with no seed properties
    pub async fn execute(
        &self,
        sequence: &[CommandDescriptor],
        executor: &dyn RemoteExecutor,
    ) -> Result<SequenceResult> {
        self.execute_seeded(sequence, executor, &PropertyBag::new())
            .await
    }

    /// Execute a sequence whose placeholders may also reference `seed`
    ///
    /// `seed` carries properties persisted by an earlier run of the same fault
    /// (for example disk backing details captured at injection time).
    ///
    /// # Errors
    /// Build-time problems (unresolved placeholder, invalid pattern) are returned
    /// as `Err` before the offending descriptor is dispatched. Remote failures
    /// are reported in the returned [`SequenceResult`].
    pub async fn execute_seeded(
        &self,
        sequence: &[CommandDescriptor],
        executor: &dyn RemoteExecutor,
        seed: &PropertyBag,
    ) -> Result<SequenceResult> {
        let dispatched = AtomicUsize::new(0);
        let mut scope = seed.clone();
        let mut result = SequenceResult::empty();

        for (index, descriptor) in sequence.iter().enumerate() {
            // Forward-only: scope holds the seed plus earlier descriptors' output
            let command = template::resolve(&descriptor.command_template, &scope)?;
            let expected = compile_all(&descriptor.expected_output_patterns)?;
            compile_all(
                &descriptor
                    .output_extractors
                    .iter()
                    .map(|e| e.pattern.clone())
                    .collect::<Vec<_>>(),
            )?;

            info!(
                descriptor = index,
                description = %descriptor.description,
                max_attempts = descriptor.max_attempts(),
                "Dispatching command"
            );

            let outcome = self
                .run_descriptor(index, descriptor, &command, &expected, &scope, executor, &dispatched)
                .await?;

            match outcome {
                DescriptorOutcome::Succeeded {
                    properties,
                    message,
                } => {
                    if let Some(message) = message {
                        result.messages.push(message);
                    }
                    scope.extend(properties.clone());
                    result.properties.extend(properties);
                }
                DescriptorOutcome::Failed(failure) => {
                    warn!(
                        descriptor = index,
                        kind = %failure.kind,
                        exit_code = ?failure.exit_code,
                        "Sequence aborted"
                    );
                    result.status = SequenceStatus::Failed;
                    result.failure = Some(failure);
                    break;
                }
            }
        }

        result.dispatched = dispatched.load(Ordering::SeqCst);
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_descriptor(
        &self,
        index: usize,
        descriptor: &CommandDescriptor,
        command: &str,
        expected: &[Regex],
        scope: &PropertyBag,
        executor: &dyn RemoteExecutor,
        dispatched: &AtomicUsize,
    ) -> Result<DescriptorOutcome> {
        let timeout = timeout_of(descriptor);
        let policy = PollPolicy::from_secs(descriptor.max_attempts(), descriptor.retry_interval_secs);

        let polled = poll_until(policy, &self.cancel, |attempt| async move {
            dispatched.fetch_add(1, Ordering::SeqCst);
            let verdict = match executor.execute(command, timeout).await {
                Ok(raw) => evaluate(descriptor, expected, raw),
                Err(ExecutionError::Unreachable(reason)) => Verdict::Unreachable(reason),
                Err(ExecutionError::InvalidCommand(reason)) => Verdict::Rejected(reason),
                Err(e) => Verdict::Failed(CommandResult::new(-1, e.to_string())),
            };
            if let Verdict::Failed(raw) = &verdict {
                warn!(
                    descriptor = index,
                    attempt,
                    exit_code = raw.exit_code,
                    "Command attempt failed"
                );
            }
            match verdict {
                Verdict::Passed(_) | Verdict::Benign(..) => PollStep::Converged(verdict),
                Verdict::Unreachable(_) | Verdict::Rejected(_) => PollStep::Abort(verdict),
                Verdict::Failed(_) => PollStep::Pending(verdict),
            }
        })
        .await;

        let failure = |kind: ErrorKind, exit_code: Option<i32>, raw_output: String| {
            let message = failure_message(&descriptor.description, kind, &raw_output);
            DescriptorOutcome::Failed(SequenceFailure {
                kind,
                descriptor_index: index,
                command: command.to_string(),
                exit_code,
                raw_output,
                message,
            })
        };

        match polled {
            PollResult::Converged {
                value: Verdict::Benign(raw, message),
                attempts,
            } => {
                info!(
                    descriptor = index,
                    attempts,
                    message = message.as_deref().unwrap_or("already in desired state"),
                    "Known failure classified as benign"
                );
                // A benign outcome means the operation did not run, so there is
                // no async task to wait for.
                let properties = extract(&raw.raw_output, &descriptor.output_extractors)?;
                Ok(DescriptorOutcome::Succeeded {
                    properties,
                    message,
                })
            }
            PollResult::Converged { value, attempts } => {
                let raw = match value {
                    Verdict::Passed(raw) => raw,
                    other => {
                        return Ok(failure(ErrorKind::Internal, None, format!("{:?}", other)));
                    }
                };
                info!(descriptor = index, attempts, "Command succeeded");
                let properties = extract(&raw.raw_output, &descriptor.output_extractors)?;
                match &descriptor.async_task {
                    None => Ok(DescriptorOutcome::Succeeded {
                        properties,
                        message: None,
                    }),
                    Some(task) => {
                        self.await_async_task(
                            index, descriptor, task, command, expected, scope, properties,
                            executor, dispatched,
                        )
                        .await
                    }
                }
            }
            PollResult::Aborted {
                value: Verdict::Unreachable(reason),
                ..
            } => Ok(failure(ErrorKind::Unreachable, None, reason)),
            PollResult::Aborted { value, .. } => {
                let reason = match value {
                    Verdict::Rejected(reason) => reason,
                    other => format!("{:?}", other),
                };
                Ok(failure(ErrorKind::CommandFailed, None, reason))
            }
            PollResult::TimedOut { last, attempts } => {
                let (exit_code, output) = match last {
                    Some(Verdict::Failed(raw)) => (Some(raw.exit_code), raw.raw_output),
                    _ => (None, String::new()),
                };
                if descriptor.converge {
                    warn!(descriptor = index, attempts, "Target state not reached");
                    Ok(failure(ErrorKind::NotConverged, exit_code, output))
                } else {
                    warn!(descriptor = index, attempts, "Command attempts exhausted");
                    Ok(failure(ErrorKind::CommandFailed, exit_code, output))
                }
            }
            PollResult::Cancelled { last, .. } => {
                let (exit_code, output) = match last {
                    Some(Verdict::Failed(raw)) => (Some(raw.exit_code), raw.raw_output),
                    _ => (None, String::new()),
                };
                Ok(failure(ErrorKind::Cancelled, exit_code, output))
            }
        }
    }

    /// Poll the adapter's task-status endpoint until the task leaves the pending state
    #[allow(clippy::too_many_arguments)]
    async fn await_async_task(
        &self,
        index: usize,
        descriptor: &CommandDescriptor,
        task: &AsyncTaskPolicy,
        command: &str,
        expected: &[Regex],
        scope: &PropertyBag,
        trigger_properties: PropertyBag,
        executor: &dyn RemoteExecutor,
        dispatched: &AtomicUsize,
    ) -> Result<DescriptorOutcome> {
        let failed = |kind: ErrorKind, exit_code: Option<i32>, raw_output: String| {
            let message = failure_message(&descriptor.description, kind, &raw_output);
            DescriptorOutcome::Failed(SequenceFailure {
                kind,
                descriptor_index: index,
                command: command.to_string(),
                exit_code,
                raw_output,
                message,
            })
        };

        let mut task_scope = scope.clone();
        task_scope.extend(trigger_properties.clone());
        let status_command = match template::resolve(&task.status_command_template, &task_scope) {
            Ok(c) => c,
            Err(e) => {
                return Ok(failed(
                    ErrorKind::CommandFailed,
                    None,
                    format!("adapter response carried no task reference ({})", e),
                ));
            }
        };

        let timeout = timeout_of(descriptor);
        let marker = task.pending_marker.as_str();
        let status_command = status_command.as_str();
        let policy = PollPolicy::from_secs(task.max_polls(), task.poll_interval_secs);

        info!(
            descriptor = index,
            max_polls = policy.max_attempts,
            "Waiting for adapter task to complete"
        );

        let polled = poll_until(policy, &self.cancel, |_| async move {
            dispatched.fetch_add(1, Ordering::SeqCst);
            match executor.execute(status_command, timeout).await {
                Ok(raw) if raw.raw_output.contains(marker) => PollStep::Pending(Ok(raw)),
                Ok(raw) => PollStep::Converged(Ok(raw)),
                Err(ExecutionError::Unreachable(reason)) => PollStep::Abort(Err(reason)),
                Err(e) => PollStep::Pending(Err(e.to_string())),
            }
        })
        .await;

        match polled {
            PollResult::Converged {
                value: Ok(raw), ..
            } => match evaluate(descriptor, expected, raw) {
                Verdict::Passed(raw) | Verdict::Benign(raw, None) => {
                    let mut properties = trigger_properties;
                    properties.extend(extract(&raw.raw_output, &descriptor.output_extractors)?);
                    Ok(DescriptorOutcome::Succeeded {
                        properties,
                        message: None,
                    })
                }
                Verdict::Benign(raw, Some(message)) => {
                    let mut properties = trigger_properties;
                    properties.extend(extract(&raw.raw_output, &descriptor.output_extractors)?);
                    Ok(DescriptorOutcome::Succeeded {
                        properties,
                        message: Some(message),
                    })
                }
                Verdict::Failed(raw) => Ok(failed(
                    ErrorKind::CommandFailed,
                    Some(raw.exit_code),
                    raw.raw_output,
                )),
                other => Ok(failed(ErrorKind::Internal, None, format!("{:?}", other))),
            },
            PollResult::Aborted {
                value: Err(reason), ..
            } => Ok(failed(ErrorKind::Unreachable, None, reason)),
            PollResult::Cancelled { .. } => Ok(failed(
                ErrorKind::Cancelled,
                None,
                "cancelled while waiting for adapter task".to_string(),
            )),
            PollResult::TimedOut { last, attempts } => {
                let output = match last {
                    Some(Ok(raw)) => raw.raw_output,
                    Some(Err(reason)) => reason,
                    None => String::new(),
                };
                warn!(descriptor = index, attempts, "Adapter task did not converge");
                Ok(failed(ErrorKind::NotConverged, None, output))
            }
            other => Ok(failed(ErrorKind::Internal, None, format!("{:?}", other))),
        }
    }
}

fn timeout_of(descriptor: &CommandDescriptor) -> Option<Duration> {
    (descriptor.timeout_secs > 0).then(|| Duration::from_secs(descriptor.timeout_secs))
}

/// Judge one raw result against the descriptor's success policy
fn evaluate(descriptor: &CommandDescriptor, expected: &[Regex], raw: CommandResult) -> Verdict {
    let exit_ok = descriptor.ignore_exit_value_check || raw.is_zero_exit();
    let output_ok = expected.is_empty() || expected.iter().any(|re| re.is_match(&raw.raw_output));
    if exit_ok && output_ok {
        return Verdict::Passed(raw);
    }
    match classify(&raw, &descriptor.known_failures) {
        Classification::Benign(message) => Verdict::Benign(raw, message),
        Classification::StillFailed => Verdict::Failed(raw),
    }
}

fn failure_message(description: &str, kind: ErrorKind, raw_output: &str) -> String {
    let output = raw_output.trim();
    let output = match output.char_indices().nth(MAX_OUTPUT_IN_MESSAGE) {
        Some((cut, _)) => &output[..cut],
        None => output,
    };
    match kind {
        ErrorKind::NotConverged => format!("{} did not converge: {}", description, output),
        ErrorKind::Unreachable => format!("{} could not reach the backend: {}", description, output),
        ErrorKind::Cancelled => format!("{} was cancelled", description),
        _ if output.is_empty() => format!("{} failed", description),
        _ => format!("{} failed: {}", description, output),
    }
}

#[cfg(test)]
#[path = "sequence_test.rs"]
mod tests;
