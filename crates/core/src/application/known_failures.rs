// Known-failure catalog
//
// Every (family, operation) table is data, embedded from `known_failures.json`
// as an ordered list so first-match semantics survive deserialization.

use crate::domain::KnownFailureTable;
use crate::error::{OrchestrationError, Result};
use serde::Deserialize;
use std::sync::LazyLock;

const CATALOG_SOURCE: &str = include_str!("known_failures.json");

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    table: String,
    entries: KnownFailureTable,
}

/// Ordered collection of named known-failure tables
#[derive(Debug, Default)]
pub struct KnownFailureCatalog {
    tables: Vec<CatalogEntry>,
}

impl KnownFailureCatalog {
    /// Parse a catalog document
    pub fn parse(source: &str) -> Result<Self> {
        let tables: Vec<CatalogEntry> = serde_json::from_str(source)?;
        for (i, entry) in tables.iter().enumerate() {
            if tables[..i].iter().any(|prev| prev.table == entry.table) {
                return Err(OrchestrationError::Config(format!(
                    "duplicate known-failure table '{}'",
                    entry.table
                )));
            }
        }
        Ok(Self { tables })
    }

    /// Look up a table by name (`family.operation`)
    pub fn get(&self, name: &str) -> Option<&KnownFailureTable> {
        self.tables
            .iter()
            .find(|entry| entry.table == name)
            .map(|entry| &entry.entries)
    }

    #[cfg(test)]
    fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|entry| entry.table.as_str())
    }
}

static CATALOG: LazyLock<std::result::Result<KnownFailureCatalog, String>> =
    LazyLock::new(|| KnownFailureCatalog::parse(CATALOG_SOURCE).map_err(|e| e.to_string()));

/// Embedded catalog shared by every builder
///
/// # Errors
/// `Config` if the embedded document does not parse.
pub fn catalog() -> Result<&'static KnownFailureCatalog> {
    CATALOG.as_ref().map_err(|reason| {
        OrchestrationError::Config(format!("embedded known-failure catalog is invalid: {}", reason))
    })
}

/// Table for `name`, or an empty table if none is defined
///
/// Callers check [`catalog`] once up front; a broken catalog yields empty tables here.
pub fn table(name: &str) -> KnownFailureTable {
    catalog()
        .ok()
        .and_then(|catalog| catalog.get(name))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_parses() {
        let parsed = tokio_test::assert_ok!(KnownFailureCatalog::parse(CATALOG_SOURCE));
        assert!(parsed.table_names().count() > 20);
    }

    #[test]
    fn test_order_preserved_from_source() {
        let remediate = table("linux.remediate");
        let patterns: Vec<&str> = remediate
            .entries()
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        assert_eq!(
            patterns,
            vec![
                "Fault already remediated",
                "No fault found with",
                "No such file or directory"
            ]
        );
        assert_eq!(remediate.entries()[0].message, None);
    }

    #[test]
    fn test_docker_state_tables_are_silent_benign() {
        for name in ["docker.pause", "docker.unpause", "docker.stop"] {
            let t = table(name);
            assert!(!t.is_empty(), "{name} should not be empty");
            assert!(t.entries().iter().all(|e| e.message.is_none()));
        }
    }

    #[test]
    fn test_unknown_table_is_empty() {
        assert!(table("nope.inject").is_empty());
    }

    #[test]
    fn test_duplicate_tables_rejected() {
        let source = r#"[{"table":"a","entries":[]},{"table":"a","entries":[]}]"#;
        tokio_test::assert_err!(KnownFailureCatalog::parse(source));
    }

    #[test]
    fn test_embedded_catalog_is_available() {
        let catalog = tokio_test::assert_ok!(catalog());
        assert!(catalog.get("kubernetes.submit").is_some());
    }
}
