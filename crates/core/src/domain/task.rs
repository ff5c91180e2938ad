// Task Domain Model (fault run lifecycle)

use crate::domain::error::{DomainError, Result};
use crate::domain::fault::FaultOperation;
use serde::{Deserialize, Serialize};

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Handle on a child task of a fan-out fault
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    /// Resource the child acts on (pod name, container, ...)
    pub resource: String,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
        }
    }
}

/// Read-only view of a child task's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTaskView {
    pub id: String,
    pub status: TaskStatus,
    pub failure_reason: Option<String>,
}

/// One fault run (injection, remediation or status check)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultRun {
    pub id: String,
    pub operation: FaultOperation,
    pub status: TaskStatus,
    pub started_at: Option<i64>, // epoch ms
    pub finished_at: Option<i64>,
    pub failure_reason: Option<String>,
}

impl FaultRun {
    pub fn new(id: impl Into<String>, operation: FaultOperation) -> Self {
        Self {
            id: id.into(),
            operation,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    /// PENDING -> IN_PROGRESS
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid_transition(TaskStatus::InProgress));
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// IN_PROGRESS -> COMPLETED
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.status != TaskStatus::InProgress {
            return Err(self.invalid_transition(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// PENDING | IN_PROGRESS -> FAILED
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.finished_at = Some(now_millis);
        Ok(())
    }

    fn invalid_transition(&self, to: TaskStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = FaultRun::new("run-1", FaultOperation::Inject);
        run.start(10).unwrap();
        run.complete(20).unwrap();
        assert_eq!(run.status, TaskStatus::Completed);
        assert_eq!(run.started_at, Some(10));
        assert_eq!(run.finished_at, Some(20));
    }

    #[test]
    fn test_cannot_complete_pending_run() {
        let mut run = FaultRun::new("run-1", FaultOperation::Remediate);
        let err = run.complete(5).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "PENDING".to_string(),
                to: "COMPLETED".to_string()
            }
        );
    }

    #[test]
    fn test_fail_before_start_is_allowed_but_not_after_terminal() {
        let mut run = FaultRun::new("run-1", FaultOperation::Inject);
        run.fail("unknown fault", 1).unwrap();
        assert_eq!(run.failure_reason.as_deref(), Some("unknown fault"));
        assert!(run.fail("again", 2).is_err());
        assert!(run.start(3).is_err());
    }
}
