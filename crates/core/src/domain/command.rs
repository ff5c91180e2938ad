// Command Descriptor Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named properties extracted from command output (ordered for stable logs)
pub type PropertyBag = BTreeMap<String, String>;

/// Ordered list of descriptors for one operation (inject, remediate or status)
pub type Sequence = Vec<CommandDescriptor>;

/// One known-failure entry: a literal output marker and an optional message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFailure {
    pub pattern: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Ordered known-failure table. Iteration order is significant: first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownFailureTable(Vec<KnownFailure>);

impl KnownFailureTable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an entry, preserving insertion order
    pub fn with(mut self, pattern: impl Into<String>, message: Option<&str>) -> Self {
        self.push(pattern, message.map(str::to_string));
        self
    }

    pub fn push(&mut self, pattern: impl Into<String>, message: Option<String>) {
        self.0.push(KnownFailure {
            pattern: pattern.into(),
            message,
        });
    }

    /// Append every entry of `other` after the current ones
    pub fn extend(&mut self, other: &KnownFailureTable) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn entries(&self) -> &[KnownFailure] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<KnownFailure> for KnownFailureTable {
    fn from_iter<I: IntoIterator<Item = KnownFailure>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Named capture applied to a successful command's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputExtractor {
    pub property: String,
    /// Regular expression; capture group 1 is used when present, else the whole match
    pub pattern: String,
}

/// Asynchronous task policy (hypervisor adapter operations)
///
/// The trigger command returns a task id; the descriptor then polls
/// `status_command_template` until its output no longer contains
/// `pending_marker`. The final status output is what gets classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncTaskPolicy {
    pub status_command_template: String,
    pub pending_marker: String,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl AsyncTaskPolicy {
    /// Number of status polls allowed by the adapter timeout (at least one)
    pub fn max_polls(&self) -> u32 {
        if self.poll_interval_secs == 0 {
            return 1;
        }
        let polls = self.timeout_secs / self.poll_interval_secs;
        polls.clamp(1, u32::MAX as u64) as u32
    }
}

/// Immutable description of one remote command and its interpretation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub command_template: String,
    /// Human-readable purpose, used in failure messages
    pub description: String,
    pub ignore_exit_value_check: bool,
    pub expected_output_patterns: Vec<String>,
    pub known_failures: KnownFailureTable,
    pub retry_count: u32,
    pub retry_interval_secs: u64,
    /// 0 means backend default
    pub timeout_secs: u64,
    pub output_extractors: Vec<OutputExtractor>,
    pub async_task: Option<AsyncTaskPolicy>,
    /// Retries poll for a target state; exhaustion is a convergence failure
    #[serde(default)]
    pub converge: bool,
}

impl CommandDescriptor {
    pub fn new(command_template: impl Into<String>) -> Self {
        let command_template = command_template.into();
        Self {
            description: command_template.clone(),
            command_template,
            ignore_exit_value_check: false,
            expected_output_patterns: Vec::new(),
            known_failures: KnownFailureTable::new(),
            retry_count: 0,
            retry_interval_secs: 0,
            timeout_secs: 0,
            output_extractors: Vec::new(),
            async_task: None,
            converge: false,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn ignore_exit_value(mut self) -> Self {
        self.ignore_exit_value_check = true;
        self
    }

    pub fn expect_output(mut self, pattern: impl Into<String>) -> Self {
        self.expected_output_patterns.push(pattern.into());
        self
    }

    pub fn known_failures(mut self, table: KnownFailureTable) -> Self {
        self.known_failures = table;
        self
    }

    pub fn retry(mut self, count: u32, interval_secs: u64) -> Self {
        self.retry_count = count;
        self.retry_interval_secs = interval_secs;
        self
    }

    /// Poll `max_attempts` times, `interval_secs` apart, until the output shows the target state
    pub fn converging(mut self, max_attempts: u32, interval_secs: u64) -> Self {
        self.retry_count = max_attempts.saturating_sub(1);
        self.retry_interval_secs = interval_secs;
        self.converge = true;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn extract(mut self, property: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.output_extractors.push(OutputExtractor {
            property: property.into(),
            pattern: pattern.into(),
        });
        self
    }

    pub fn await_task(mut self, policy: AsyncTaskPolicy) -> Self {
        self.async_task = Some(policy);
        self
    }

    /// Maximum executor calls for the command itself (excludes async status polls)
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

/// Raw outcome of one executor call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub raw_output: String,
    #[serde(default)]
    pub extracted_properties: PropertyBag,
}

impl CommandResult {
    pub fn new(exit_code: i32, raw_output: impl Into<String>) -> Self {
        Self {
            exit_code,
            raw_output: raw_output.into(),
            extracted_properties: PropertyBag::new(),
        }
    }

    pub fn success(raw_output: impl Into<String>) -> Self {
        Self::new(0, raw_output)
    }

    pub fn is_zero_exit(&self) -> bool {
        self.exit_code == 0
    }
}
