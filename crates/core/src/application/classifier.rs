// Known-Failure Classifier

use crate::domain::{CommandResult, KnownFailureTable};

/// Classification of an apparently failed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Genuine failure
    StillFailed,
    /// Benign / idempotent outcome; the optional message explains it to operators
    Benign(Option<String>),
}

impl Classification {
    pub fn is_benign(&self) -> bool {
        matches!(self, Classification::Benign(_))
    }
}

/// Classify a result against an ordered known-failure table
///
/// A table key matches when it occurs anywhere in the raw output; the first
/// matching entry wins. The exit code is not consulted.
pub fn classify(result: &CommandResult, table: &KnownFailureTable) -> Classification {
    table
        .entries()
        .iter()
        .find(|entry| !entry.pattern.is_empty() && result.raw_output.contains(&entry.pattern))
        .map(|entry| Classification::Benign(entry.message.clone()))
        .unwrap_or(Classification::StillFailed)
}
