// Fault Metadata Store Port
// Flat property bag keyed by fault run id; survives process restarts

use crate::domain::PropertyBag;
use crate::error::Result;
use async_trait::async_trait;

/// Fault metadata store trait
#[async_trait]
pub trait FaultMetadataStore: Send + Sync {
    /// Load every property recorded for a run (empty if none)
    async fn load(&self, run_id: &str) -> Result<PropertyBag>;

    /// Merge properties into a run's bag (existing names are overwritten)
    async fn save(&self, run_id: &str, properties: &PropertyBag) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store (single process)
    #[derive(Default)]
    pub struct InMemoryMetadataStore {
        runs: Mutex<HashMap<String, PropertyBag>>,
    }

    impl InMemoryMetadataStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FaultMetadataStore for InMemoryMetadataStore {
        async fn load(&self, run_id: &str) -> Result<PropertyBag> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .get(run_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn save(&self, run_id: &str, properties: &PropertyBag) -> Result<()> {
            let mut runs = self.runs.lock().unwrap();
            let bag = runs.entry(run_id.to_string()).or_default();
            bag.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        }
    }
}
