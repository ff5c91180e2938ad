//! Fault metadata persistence across process restarts
//!
//! Injection and remediation run in separate runners that share nothing but
//! the SQLite file, the way two invocations of the runner binary would.

use std::sync::Arc;

use chaos_core::application::constants::RESOLVED_TARGETS_PROPERTY;
use chaos_core::application::{CancelToken, FaultRunner};
use chaos_core::domain::{CommandResult, FaultOperation, FaultSpec, TaskStatus};
use chaos_core::port::remote_executor::mocks::{ScriptedExecutor, StaticExecutorFactory};
use chaos_core::port::task_sink::mocks::RecordingTaskSink;
use chaos_core::port::time_provider::SystemTimeProvider;
use chaos_core::port::FaultMetadataStore;
use chaos_core::EngineConfig;
use chaos_infra_sqlite::{create_pool, run_migrations, SqliteMetadataStore};

fn test_db(name: &str) -> String {
    let path = format!("/tmp/chaos_it_{}_{}.db", name, std::process::id());
    let _ = std::fs::remove_file(&path);
    path
}

async fn open_store(path: &str) -> Arc<SqliteMetadataStore> {
    let pool = create_pool(&format!("sqlite://{}", path)).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteMetadataStore::new(pool, Arc::new(SystemTimeProvider)))
}

fn runner(endpoint: &str, remote: Arc<ScriptedExecutor>, store: Arc<SqliteMetadataStore>) -> FaultRunner {
    let config = EngineConfig {
        hypervisor_poll_interval_secs: 1,
        hypervisor_timeout_secs: 5,
        ..EngineConfig::default()
    };
    FaultRunner::new(
        Arc::new(config),
        Arc::new(StaticExecutorFactory::new().with(endpoint, remote)),
        store,
        Arc::new(SystemTimeProvider),
    )
}

fn spec(value: serde_json::Value) -> FaultSpec {
    serde_json::from_value(value).unwrap()
}

/// Disk backing recorded at disconnect is replayed at reconnect after a restart
#[tokio::test]
async fn test_disk_reconnect_after_restart() {
    let db = test_db("disk");
    let disk = spec(serde_json::json!({
        "run_id": "run-disk",
        "fault_name": "vm-disk-disconnect",
        "args": { "diskId": "2001" },
        "endpoint_type": "HYPERVISOR",
        "endpoint_name": "vc-1",
        "target": { "kind": "hypervisor", "resource_id": "vm-42" }
    }));

    // Process 1: inject
    {
        let remote = Arc::new(
            ScriptedExecutor::new()
                .on(
                    "POST /api/v1/vms/vm-42/disks/2001/disconnect",
                    vec![CommandResult::success(r#"{"taskId":"t-9","taskStatus":"TRIGGERED"}"#)],
                )
                .on(
                    "GET /api/v1/tasks/t-9",
                    vec![CommandResult::success(
                        r#"{"taskStatus":"COMPLETED","type":"VirtualDisk","backingType":"SeSparse","backingVMDKFile":"[ds2] vm-42/vm-42_3.vmdk"}"#,
                    )],
                ),
        );
        let sink = Arc::new(RecordingTaskSink::new());
        let report = runner("vc-1", remote, open_store(&db).await)
            .run(FaultOperation::Inject, &disk, sink.clone(), CancelToken::never())
            .await
            .unwrap();

        assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    }

    // Process 2: remediate with a fresh pool on the same file
    let store = open_store(&db).await;
    let stored = store.load("run-disk").await.unwrap();
    assert_eq!(stored.get("backingType").map(String::as_str), Some("SeSparse"));
    assert_eq!(stored.get(RESOLVED_TARGETS_PROPERTY).map(String::as_str), Some("vm-42"));

    let remote = Arc::new(
        ScriptedExecutor::new()
            .on(
                "POST /api/v1/vms/vm-42/disks/2001/connect",
                vec![CommandResult::success(r#"{"taskId":"t-10","taskStatus":"TRIGGERED"}"#)],
            )
            .on(
                "GET /api/v1/tasks/t-10",
                vec![CommandResult::success(r#"{"taskStatus":"COMPLETED"}"#)],
            ),
    );
    let sink = Arc::new(RecordingTaskSink::new());
    let report = runner("vc-1", remote.clone(), store)
        .run(FaultOperation::Remediate, &disk, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    let connect = &remote.calls()[0];
    assert!(connect.contains(r#""backingType":"SeSparse""#));
    assert!(connect.contains(r#""backingVMDKFile":"[ds2] vm-42/vm-42_3.vmdk""#));

    let _ = std::fs::remove_file(&db);
}

/// The original container image captured at injection is patched back at remediation
#[tokio::test]
async fn test_resource_not_ready_restores_original_image() {
    let db = test_db("not_ready");
    let not_ready = spec(serde_json::json!({
        "run_id": "run-rnr",
        "fault_name": "resource-not-ready",
        "endpoint_type": "KUBERNETES",
        "endpoint_name": "cluster-a",
        "target": {
            "kind": "kubernetes",
            "namespace": "shop",
            "resource_names": ["web-0"],
            "container": "app"
        }
    }));

    let inject_remote = Arc::new(
        ScriptedExecutor::new()
            .on(".metadata.name", vec![CommandResult::success("web-0")])
            .on(
                "readinessProbe",
                vec![CommandResult::success(
                    r#"nginx:1.25 {"httpGet":{"path":"/healthz","port":80}}"#,
                )],
            )
            .on(
                "containerStatuses",
                vec![CommandResult::success("false")],
            ),
    );
    let sink = Arc::new(RecordingTaskSink::new());
    let report = runner("cluster-a", inject_remote.clone(), open_store(&db).await)
        .run(FaultOperation::Inject, &not_ready, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    assert_eq!(inject_remote.calls_matching("kubectl patch pod web-0"), 1);

    let remediate_remote = Arc::new(
        ScriptedExecutor::new().on("containerStatuses", vec![CommandResult::success("true")]),
    );
    let report = runner("cluster-a", remediate_remote.clone(), open_store(&db).await)
        .run(FaultOperation::Remediate, &not_ready, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    let calls = remediate_remote.calls();
    // Targets come from metadata, so no name lookup on remediation
    assert!(calls[0].starts_with("kubectl patch pod web-0 -n shop -p"));
    assert!(calls[0].contains(r#""image":"nginx:1.25""#));

    let _ = std::fs::remove_file(&db);
}
