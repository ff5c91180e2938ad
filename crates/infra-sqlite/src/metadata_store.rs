// SQLite FaultMetadataStore Implementation

use async_trait::async_trait;
use chaos_core::domain::PropertyBag;
use chaos_core::error::{OrchestrationError, Result};
use chaos_core::port::{FaultMetadataStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

// Helper to convert sqlx::Error to OrchestrationError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> OrchestrationError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" => OrchestrationError::Storage(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => {
                        OrchestrationError::Storage(format!("Database full: {}", db_err.message()))
                    }
                    _ => OrchestrationError::Storage(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                OrchestrationError::Storage(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => OrchestrationError::Storage("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            OrchestrationError::Storage(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => OrchestrationError::Storage(err.to_string()),
    }
}

/// Fault metadata persisted in SQLite, shared across processes
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl FaultMetadataStore for SqliteMetadataStore {
    async fn load(&self, run_id: &str) -> Result<PropertyBag> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, value FROM fault_metadata WHERE run_id = ? ORDER BY name")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        debug!(run_id = %run_id, properties = rows.len(), "Loaded fault metadata");
        Ok(rows.into_iter().collect())
    }

    async fn save(&self, run_id: &str, properties: &PropertyBag) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }
        let now = self.time_provider.now_millis();

        // All properties of one save land atomically
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for (name, value) in properties {
            sqlx::query(
                r#"
                INSERT INTO fault_metadata (run_id, name, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (run_id, name) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(run_id)
            .bind(name)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(run_id = %run_id, properties = properties.len(), "Saved fault metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use chaos_core::port::time_provider::ManualTimeProvider;

    async fn setup_test_db() -> (SqlitePool, Arc<ManualTimeProvider>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, Arc::new(ManualTimeProvider::new(1_000)))
    }

    fn bag(pairs: &[(&str, &str)]) -> PropertyBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_load_unknown_run_is_empty() {
        let (pool, clock) = setup_test_db().await;
        let store = SqliteMetadataStore::new(pool, clock);

        assert!(store.load("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (pool, clock) = setup_test_db().await;
        let store = SqliteMetadataStore::new(pool, clock);

        store
            .save(
                "run-1",
                &bag(&[("backingType", "FlatVer2"), ("type", "VirtualDisk")]),
            )
            .await
            .unwrap();

        let loaded = store.load("run-1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("backingType").map(String::as_str), Some("FlatVer2"));
    }

    #[tokio::test]
    async fn test_save_merges_and_overwrites() {
        let (pool, clock) = setup_test_db().await;
        let store = SqliteMetadataStore::new(pool.clone(), clock.clone());

        store
            .save("run-1", &bag(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();
        clock.advance(500);
        store.save("run-1", &bag(&[("b", "3")])).await.unwrap();

        assert_eq!(store.load("run-1").await.unwrap(), bag(&[("a", "1"), ("b", "3")]));

        let updated_at: i64 =
            sqlx::query_scalar("SELECT updated_at FROM fault_metadata WHERE run_id = ? AND name = ?")
                .bind("run-1")
                .bind("b")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(updated_at, 1_500);
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let (pool, clock) = setup_test_db().await;
        let store = SqliteMetadataStore::new(pool, clock);

        store.save("run-1", &bag(&[("x", "1")])).await.unwrap();
        store.save("run-2", &bag(&[("x", "2")])).await.unwrap();

        assert_eq!(store.load("run-1").await.unwrap(), bag(&[("x", "1")]));
        assert_eq!(store.load("run-2").await.unwrap(), bag(&[("x", "2")]));
    }
}
