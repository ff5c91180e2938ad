//! Chaos Runner - Main Entry Point
//! One-shot fault injection, remediation or status check

mod settings;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chaos_core::application::{cancel_channel, FaultRunReport, FaultRunner};
use chaos_core::domain::TaskStatus;
use chaos_core::port::time_provider::SystemTimeProvider;
use chaos_infra_sqlite::{create_pool, run_migrations, SqliteMetadataStore};
use chaos_infra_system::EndpointRegistry;

use settings::{expand_path, load_spec, Cli, ReportFormat};
use sink::ConsoleTaskSink;

fn init_logging() -> Result<()> {
    let log_format = std::env::var("CHAOS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("chaos=info"))
        .context("Failed to create env filter")?;

    // stdout carries task output; logs go to stderr
    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn print_report(report: &FaultRunReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => {
            println!(
                "{} {} -> {}",
                report.run.operation,
                report.run.id,
                report.status()
            );
            if let Some(reason) = &report.run.failure_reason {
                println!("reason: {}", reason);
            }
        }
        ReportFormat::Json => {
            let children: Option<Vec<serde_json::Value>> = report.children.as_ref().map(|c| {
                c.outcomes
                    .iter()
                    .map(|o| {
                        serde_json::json!({
                            "resource": o.handle.resource,
                            "task": o.handle.id,
                            "status": o.status,
                            "converged": o.converged,
                            "failure_reason": o.failure_reason,
                        })
                    })
                    .collect()
            });
            let summary = serde_json::json!({
                "run": report.run,
                "resources": report.resources,
                "error_kind": report.error_kind,
                "sequence": report.sequence,
                "children": children,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<TaskStatus> {
    info!("Chaos runner v{} starting...", chaos_core::VERSION);

    // 1. Load configuration
    let config = Arc::new(cli.engine_config()?);
    let args = cli.command.args();
    let operation = cli.command.operation();
    let spec = load_spec(args)?;

    let endpoints_path = expand_path(&cli.endpoints)?;
    let endpoints_json = std::fs::read_to_string(&endpoints_path)
        .with_context(|| format!("Failed to read endpoint file {}", endpoints_path))?;
    let endpoints = EndpointRegistry::from_json(
        &endpoints_json,
        Duration::from_secs(cli.command_timeout_secs),
    )?;
    info!(endpoints = endpoints.len(), path = %endpoints_path, "Endpoints loaded");

    // 2. Initialize metadata store
    let db_path = expand_path(&cli.db)?;
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %db_path, "Initializing metadata store...");
    let pool = create_pool(&format!("sqlite://{}", db_path))
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Wire dependencies
    let clock = Arc::new(SystemTimeProvider);
    let metadata = Arc::new(SqliteMetadataStore::new(pool, clock.clone()));
    let runner = FaultRunner::new(config, Arc::new(endpoints), metadata, clock);
    let sink = Arc::new(ConsoleTaskSink::new(spec.run_id.clone()));

    // 4. Cancel on Ctrl+C
    let (cancel_handle, cancel) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling fault run...");
            cancel_handle.cancel();
        }
    });

    info!(run_id = %spec.run_id, fault = %spec.fault_name, %operation, fan_out = args.fan_out, "Running fault operation");
    let report = if args.fan_out {
        runner.run_fan_out(operation, &spec, sink.clone(), cancel).await?
    } else {
        runner.run(operation, &spec, sink.clone(), cancel).await?
    };

    print_report(&report, args.report)?;
    Ok(report.status())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(TaskStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fault run aborted");
            ExitCode::from(2)
        }
    }
}
