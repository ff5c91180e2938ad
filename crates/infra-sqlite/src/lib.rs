// Chaos Infrastructure - SQLite Adapter
// Implements: FaultMetadataStore

mod connection;
mod metadata_store;
mod migration;

pub use connection::create_pool;
pub use metadata_store::SqliteMetadataStore;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for OrchestrationError here)
