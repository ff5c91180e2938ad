// Child Task Source Port (fan-out faults)

use crate::domain::{ChildTaskView, TaskHandle};
use crate::error::Result;
use async_trait::async_trait;

/// Read-only access to child task state
#[async_trait]
pub trait ChildTaskSource: Send + Sync {
    /// Fetch the current view of a child task
    async fn status(&self, child: &TaskHandle) -> Result<ChildTaskView>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::error::OrchestrationError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves a scripted status sequence per child id (last entry repeats)
    #[derive(Default)]
    pub struct ScriptedChildTasks {
        scripts: Mutex<HashMap<String, (Vec<(TaskStatus, Option<String>)>, usize)>>,
        queries: Mutex<usize>,
    }

    impl ScriptedChildTasks {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, id: impl Into<String>, statuses: Vec<(TaskStatus, Option<&str>)>) -> Self {
            let statuses = statuses
                .into_iter()
                .map(|(s, r)| (s, r.map(str::to_string)))
                .collect();
            self.scripts.lock().unwrap().insert(id.into(), (statuses, 0));
            self
        }

        pub fn query_count(&self) -> usize {
            *self.queries.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChildTaskSource for ScriptedChildTasks {
        async fn status(&self, child: &TaskHandle) -> Result<ChildTaskView> {
            *self.queries.lock().unwrap() += 1;
            let mut scripts = self.scripts.lock().unwrap();
            let (statuses, served) = scripts
                .get_mut(&child.id)
                .ok_or_else(|| OrchestrationError::Internal(format!("unknown child {}", child.id)))?;
            if statuses.is_empty() {
                return Err(OrchestrationError::Internal(format!("empty script for {}", child.id)));
            }
            let idx = (*served).min(statuses.len() - 1);
            *served += 1;
            let (status, reason) = statuses[idx].clone();
            Ok(ChildTaskView {
                id: child.id.clone(),
                status,
                failure_reason: reason,
            })
        }
    }
}
