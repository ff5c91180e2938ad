//! Kubernetes faults through the full runner: agent pipeline fan-out,
//! reproducible random selection, and service selector round trip

use std::collections::BTreeMap;
use std::sync::Arc;

use chaos_core::application::{CancelToken, FaultRunner};
use chaos_core::domain::{CommandResult, FaultOperation, FaultSpec, FaultTarget, TaskStatus};
use chaos_core::port::metadata_store::mocks::InMemoryMetadataStore;
use chaos_core::port::remote_executor::mocks::{ScriptedExecutor, StaticExecutorFactory};
use chaos_core::port::task_sink::mocks::RecordingTaskSink;
use chaos_core::port::time_provider::ManualTimeProvider;
use chaos_core::port::FaultMetadataStore;
use chaos_core::EngineConfig;

fn runner(
    config: EngineConfig,
    remote: Arc<ScriptedExecutor>,
    metadata: Arc<InMemoryMetadataStore>,
) -> FaultRunner {
    FaultRunner::new(
        Arc::new(config),
        Arc::new(StaticExecutorFactory::new().with("cluster-a", remote)),
        metadata,
        Arc::new(ManualTimeProvider::new(0)),
    )
}

fn kube_spec(
    run_id: &str,
    fault: &str,
    resource_type: &str,
    names: &[&str],
    labels: &[(&str, &str)],
    args: &[(&str, &str)],
) -> FaultSpec {
    FaultSpec {
        run_id: run_id.to_string(),
        fault_name: fault.to_string(),
        args: args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        endpoint_type: "KUBERNETES".to_string(),
        endpoint_name: "cluster-a".to_string(),
        injection_home_dir: None,
        target: FaultTarget::Kubernetes {
            namespace: "shop".to_string(),
            resource_type: resource_type.to_string(),
            resource_names: names.iter().map(|n| n.to_string()).collect(),
            resource_labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            container: None,
        },
        timeout_ms: 60_000,
        random_injection: false,
    }
}

/// Each pod gets its own child running the four-phase agent pipeline
#[tokio::test(start_paused = true)]
async fn test_agent_fault_fans_out_per_pod() {
    let remote = Arc::new(
        ScriptedExecutor::new()
            .on("get pod web-0", vec![CommandResult::success("web-0")])
            .on("get pod web-1", vec![CommandResult::success("web-1")]),
    );
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let config = EngineConfig {
        child_poll: chaos_core::config::PollSettings {
            max_attempts: 10,
            interval_secs: 1,
        },
        ..EngineConfig::default()
    };
    let spec = kube_spec("run-cpu", "cpu", "pod", &["web-0", "web-1"], &[], &[("load", "70")]);
    let sink = Arc::new(RecordingTaskSink::new());

    let report = runner(config, remote.clone(), metadata.clone())
        .run_fan_out(FaultOperation::Inject, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    assert_eq!(remote.calls_matching("kubectl cp"), 2);
    assert_eq!(remote.calls_matching("chmod 755"), 2);
    assert_eq!(remote.calls_matching("tar -zxvf"), 2);
    assert_eq!(remote.calls_matching("--operation inject --faultname cpuFault"), 2);

    let lines = sink.lines();
    assert!(lines.contains(&"resource=web-0 outcome=COMPLETED task=run-cpu/web-0".to_string()));
    assert!(lines.contains(&"resource=web-1 outcome=COMPLETED task=run-cpu/web-1".to_string()));

    // Each child pins its own pod for remediation
    let child = metadata.load("run-cpu/web-1").await.unwrap();
    assert_eq!(child.get("resolvedTargets").map(String::as_str), Some("web-1"));
}

/// A fixed seed picks the same pod every time; remediation follows the pick
#[tokio::test]
async fn test_seeded_random_selection_is_reproducible() {
    let mut picks = Vec::new();
    for _ in 0..2 {
        let remote = Arc::new(ScriptedExecutor::new().on(
            "-l app=web",
            vec![CommandResult::success("web-0 web-1 web-2 web-3")],
        ));
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let config = EngineConfig {
            random_seed: Some(1234),
            ..EngineConfig::default()
        };
        let mut spec = kube_spec("run-del", "delete-resource", "pod", &[], &[("app", "web")], &[]);
        spec.random_injection = true;
        let sink = Arc::new(RecordingTaskSink::new());

        let report = runner(config, remote.clone(), metadata.clone())
            .run(FaultOperation::Inject, &spec, sink, CancelToken::never())
            .await
            .unwrap();

        assert_eq!(report.status(), TaskStatus::Completed);
        assert_eq!(report.resources.len(), 1);
        assert_eq!(remote.calls_matching("kubectl delete pod"), 1);
        assert_eq!(
            metadata.load("run-del").await.unwrap().get("resolvedTargets"),
            Some(&report.resources[0])
        );
        picks.push(report.resources[0].clone());
    }

    assert_eq!(picks[0], picks[1]);
}

/// The captured selector is written back verbatim on remediation
#[tokio::test]
async fn test_service_selector_round_trip() {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let spec = kube_spec("run-svc", "service-unavailable", "service", &["web"], &[], &[]);

    let inject_remote = Arc::new(
        ScriptedExecutor::new()
            // Selector capture first: its command also names the service
            .on(
                "jsonpath='{.spec.selector}'",
                vec![CommandResult::success(r#"{"app":"web","tier":"front"}"#)],
            )
            .on("get service web", vec![CommandResult::success("web")])
            .on("get endpoints web", vec![CommandResult::success("<no value>")]),
    );
    let sink = Arc::new(RecordingTaskSink::new());
    let report = runner(EngineConfig::default(), inject_remote.clone(), metadata.clone())
        .run(FaultOperation::Inject, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    assert_eq!(inject_remote.calls_matching(r#""chaos-injected":"run-svc""#), 1);

    let remediate_remote = Arc::new(ScriptedExecutor::new().on(
        "get endpoints web",
        vec![CommandResult::success("addresses ")],
    ));
    let report = runner(EngineConfig::default(), remediate_remote.clone(), metadata)
        .run(FaultOperation::Remediate, &spec, sink.clone(), CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.status(), TaskStatus::Completed, "reasons: {:?}", sink.reasons());
    assert!(remediate_remote.calls()[0]
        .contains(r#""path":"/spec/selector","value":{"app":"web","tier":"front"}}]"#));
}
