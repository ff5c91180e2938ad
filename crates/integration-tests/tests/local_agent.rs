//! Linux faults against a real shell: a stand-in agent script on the local
//! machine, reached through the endpoint registry and the shell executor

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use chaos_core::application::{CancelToken, FaultRunner};
use chaos_core::domain::{FaultOperation, FaultSpec, FaultTarget, TaskStatus};
use chaos_core::error::ErrorKind;
use chaos_core::port::task_sink::mocks::RecordingTaskSink;
use chaos_core::port::time_provider::SystemTimeProvider;
use chaos_core::EngineConfig;
use chaos_infra_sqlite::{create_pool, run_migrations, SqliteMetadataStore};
use chaos_infra_system::EndpointRegistry;

const AGENT_SCRIPT: &str = r#"#!/bin/sh
case "$*" in
  *"--operation inject"*"--load 101"*)
    echo "load must be between 1 and 100" >&2
    exit 2 ;;
  *"--operation inject"*)
    echo "Fault submitted: $*"
    exit 0 ;;
  *"--operation remediate"*)
    echo "No fault found with id cpuFault"
    exit 1 ;;
  *)
    echo "cpuFault RUNNING"
    exit 0 ;;
esac
"#;

struct LocalAgent {
    dir: String,
}

impl LocalAgent {
    fn install(name: &str) -> Self {
        let dir = format!("/tmp/chaos_it_agent_{}_{}", name, std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let binary = format!("{}/chaos-agent", dir);
        std::fs::write(&binary, AGENT_SCRIPT).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }
}

impl Drop for LocalAgent {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

async fn runner(agent: &LocalAgent) -> FaultRunner {
    let config = EngineConfig {
        script_base_path: agent.dir.clone(),
        agent_binary: "chaos-agent".to_string(),
        ..EngineConfig::default()
    };
    let endpoints =
        EndpointRegistry::from_json(r#"{"local": {"kind": "local"}}"#, Duration::from_secs(10))
            .unwrap();
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let clock = Arc::new(SystemTimeProvider);

    FaultRunner::new(
        Arc::new(config),
        Arc::new(endpoints),
        Arc::new(SqliteMetadataStore::new(pool, clock.clone())),
        clock,
    )
}

fn cpu_spec(load: &str) -> FaultSpec {
    FaultSpec {
        run_id: "run-local".to_string(),
        fault_name: "cpu".to_string(),
        args: [("load".to_string(), load.to_string())].into_iter().collect(),
        endpoint_type: "LINUX".to_string(),
        endpoint_name: "local".to_string(),
        injection_home_dir: None,
        target: FaultTarget::Host {
            host: "localhost".to_string(),
        },
        timeout_ms: 10_000,
        random_injection: false,
    }
}

#[tokio::test]
async fn test_inject_status_remediate_cycle() {
    let agent = LocalAgent::install("cycle");
    let runner = runner(&agent).await;
    let spec = cpu_spec("80");

    let sink = Arc::new(RecordingTaskSink::new());
    let inject = runner
        .run(FaultOperation::Inject, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(inject.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    let output = &inject.sequence.as_ref().unwrap().messages;
    assert!(output.is_empty());

    let sink = Arc::new(RecordingTaskSink::new());
    let status = runner
        .run(FaultOperation::Status, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(status.status(), TaskStatus::Completed);

    // The agent reports nothing to remediate: benign, surfaced as output
    let sink = Arc::new(RecordingTaskSink::new());
    let remediate = runner
        .run(FaultOperation::Remediate, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(remediate.status(), TaskStatus::Completed);
    assert!(sink
        .lines()
        .contains(&"No active fault matches the request; nothing to remediate".to_string()));
}

#[tokio::test]
async fn test_agent_rejection_fails_run_with_output() {
    let agent = LocalAgent::install("reject");
    let runner = runner(&agent).await;
    let sink = Arc::new(RecordingTaskSink::new());

    let report = runner
        .run(FaultOperation::Inject, &cpu_spec("101"), sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Failed);
    assert_eq!(report.error_kind, Some(ErrorKind::CommandFailed));
    assert!(sink.reasons()[0].contains("load must be between 1 and 100"));
}

#[tokio::test]
async fn test_unconfigured_endpoint_fails_before_dispatch() {
    let agent = LocalAgent::install("noendpoint");
    let runner = runner(&agent).await;
    let mut spec = cpu_spec("50");
    spec.endpoint_name = "elsewhere".to_string();
    let sink = Arc::new(RecordingTaskSink::new());

    let report = runner
        .run(FaultOperation::Inject, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Failed);
    assert_eq!(report.error_kind, Some(ErrorKind::Config));
}
