// Task Sink Port
// The engine reports progress into an externally owned task record

use crate::domain::TaskStatus;
use async_trait::async_trait;

/// Task sink trait
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Append a human-readable progress line to the task output
    async fn update_task_output(&self, line: &str);

    /// Record a failure reason on the task
    async fn update_task_failure_reason(&self, reason: &str);

    /// Move the task to a new status
    async fn update_task_status(&self, status: TaskStatus);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records everything written to it
    #[derive(Default)]
    pub struct RecordingTaskSink {
        lines: Mutex<Vec<String>>,
        reasons: Mutex<Vec<String>>,
        statuses: Mutex<Vec<TaskStatus>>,
    }

    impl RecordingTaskSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        pub fn reasons(&self) -> Vec<String> {
            self.reasons.lock().unwrap().clone()
        }

        pub fn statuses(&self) -> Vec<TaskStatus> {
            self.statuses.lock().unwrap().clone()
        }

        pub fn last_status(&self) -> Option<TaskStatus> {
            self.statuses.lock().unwrap().last().copied()
        }
    }

    #[async_trait]
    impl TaskSink for RecordingTaskSink {
        async fn update_task_output(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        async fn update_task_failure_reason(&self, reason: &str) {
            self.reasons.lock().unwrap().push(reason.to_string());
        }

        async fn update_task_status(&self, status: TaskStatus) {
            self.statuses.lock().unwrap().push(status);
        }
    }
}
