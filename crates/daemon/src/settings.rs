//! Command line and environment settings

use anyhow::{Context, Result};
use chaos_core::domain::{FaultOperation, FaultSpec};
use chaos_core::EngineConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "~/.chaos/metadata.db";
pub const DEFAULT_ENDPOINTS_PATH: &str = "~/.chaos/endpoints.json";

#[derive(Parser, Debug)]
#[command(name = "chaos-runner")]
#[command(about = "Inject, remediate and check faults against configured endpoints", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// SQLite file holding fault metadata between runs
    #[arg(long, env = "CHAOS_DB_PATH", default_value = DEFAULT_DB_PATH, global = true)]
    pub db: String,

    /// JSON file mapping endpoint names to how they are reached
    #[arg(long, env = "CHAOS_ENDPOINTS", default_value = DEFAULT_ENDPOINTS_PATH, global = true)]
    pub endpoints: String,

    /// JSON engine configuration (missing fields use defaults)
    #[arg(long, env = "CHAOS_CONFIG", global = true)]
    pub config: Option<String>,

    /// Upper bound for a single remote command
    #[arg(long, env = "CHAOS_COMMAND_TIMEOUT_SECS", default_value = "300", global = true)]
    pub command_timeout_secs: u64,

    /// Fixed seed for random target selection
    #[arg(long, env = "CHAOS_RANDOM_SEED", global = true)]
    pub random_seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inject a fault
    Inject(RunArgs),
    /// Remediate a previously injected fault
    Remediate(RunArgs),
    /// Check whether a fault is in effect
    Status(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Fault spec as a JSON file
    #[arg(long)]
    pub spec: PathBuf,

    /// Run id under which metadata is stored (overrides the one in the file)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Run one child task per resolved resource
    #[arg(long)]
    pub fan_out: bool,

    /// Output format for the final report
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl Commands {
    pub fn operation(&self) -> FaultOperation {
        match self {
            Commands::Inject(_) => FaultOperation::Inject,
            Commands::Remediate(_) => FaultOperation::Remediate,
            Commands::Status(_) => FaultOperation::Status,
        }
    }

    pub fn args(&self) -> &RunArgs {
        match self {
            Commands::Inject(args) | Commands::Remediate(args) | Commands::Status(args) => args,
        }
    }
}

/// Expand `~` and environment variables in a path argument
pub fn expand_path(path: &str) -> Result<String> {
    shellexpand::full(path)
        .map(|p| p.into_owned())
        .with_context(|| format!("Failed to expand path '{}'", path))
}

impl Cli {
    /// Engine configuration: file (if any), then command line overrides
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = expand_path(path)?;
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid config file {}", path))?
            }
            None => EngineConfig::default(),
        };
        if self.random_seed.is_some() {
            config.random_seed = self.random_seed;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Load the fault spec, assigning a run id when neither the file nor the flag has one
pub fn load_spec(args: &RunArgs) -> Result<FaultSpec> {
    let text = std::fs::read_to_string(&args.spec)
        .with_context(|| format!("Failed to read fault spec {}", args.spec.display()))?;
    let mut spec = parse_spec(&text)?;
    if let Some(run_id) = &args.run_id {
        spec.run_id = run_id.clone();
    }
    if spec.run_id.trim().is_empty() {
        spec.run_id = uuid::Uuid::new_v4().to_string();
    }
    Ok(spec)
}

fn parse_spec(text: &str) -> Result<FaultSpec> {
    let mut value: serde_json::Value = serde_json::from_str(text).context("Invalid fault spec")?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("run_id")
            .or_insert_with(|| serde_json::Value::String(String::new()));
    }
    serde_json::from_value(value).context("Invalid fault spec")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "fault_name": "cpu",
        "args": { "load": "80" },
        "endpoint_type": "LINUX",
        "endpoint_name": "host-a",
        "target": { "kind": "host", "host": "10.0.0.5" }
    }"#;

    #[test]
    fn test_parse_subcommand() {
        let cli = Cli::try_parse_from([
            "chaos-runner",
            "remediate",
            "--spec",
            "/tmp/spec.json",
            "--run-id",
            "run-7",
            "--db",
            "/tmp/meta.db",
        ])
        .unwrap();

        assert_eq!(cli.command.operation(), FaultOperation::Remediate);
        assert_eq!(cli.command.args().run_id.as_deref(), Some("run-7"));
        assert_eq!(cli.db, "/tmp/meta.db");
        assert!(!cli.command.args().fan_out);
    }

    #[test]
    fn test_seed_flag_overrides_config() {
        let cli = Cli::try_parse_from([
            "chaos-runner",
            "--random-seed",
            "42",
            "inject",
            "--spec",
            "spec.json",
        ])
        .unwrap();

        assert_eq!(cli.engine_config().unwrap().random_seed, Some(42));
    }

    #[test]
    fn test_spec_without_run_id_parses() {
        let spec = parse_spec(SPEC).unwrap();
        assert_eq!(spec.fault_name, "cpu");
        assert!(spec.run_id.is_empty());
        assert_eq!(spec.timeout_ms, 60_000);
    }

    #[test]
    fn test_expand_path_handles_tilde() {
        let expanded = tokio_test::assert_ok!(expand_path("~/x.db"));
        assert!(!expanded.starts_with('~'));
    }
}
