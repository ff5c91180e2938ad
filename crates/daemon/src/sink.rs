//! Task sink for command-line runs: output lines to stdout, status to the log

use async_trait::async_trait;
use chaos_core::domain::TaskStatus;
use chaos_core::port::TaskSink;
use std::sync::Mutex;
use tracing::{info, warn};

pub struct ConsoleTaskSink {
    run_id: String,
    status: Mutex<TaskStatus>,
}

impl ConsoleTaskSink {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: Mutex::new(TaskStatus::Pending),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(TaskStatus::Failed)
    }
}

#[async_trait]
impl TaskSink for ConsoleTaskSink {
    async fn update_task_output(&self, line: &str) {
        println!("{}", line);
    }

    async fn update_task_failure_reason(&self, reason: &str) {
        warn!(run_id = %self.run_id, reason = %reason, "Fault run failed");
    }

    async fn update_task_status(&self, status: TaskStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
        info!(run_id = %self.run_id, status = %status, "Task status changed");
    }
}
