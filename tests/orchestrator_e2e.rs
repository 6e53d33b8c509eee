//! Library-level runs: stock suite runners against real subprocess fixtures,
//! with the cluster replaced by the in-memory adapter.

#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use spot_test_orchestrator::cluster::adapter::{ConditionStatus, ReadyCondition};
use spot_test_orchestrator::cluster::memory::RecordedCall;
use spot_test_orchestrator::prelude::*;
use spot_test_orchestrator::report::load_report;

fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    config.test_suites.terratest.enabled = false;
    config.test_suites.bash.working_dir = root.join("bash");
    config.test_suites.bash.timeout_minutes = 1;
    config.test_suites.python.working_dir = root.join("python");
    config.test_suites.python.timeout_minutes = 1;
    config.monitoring.eviction_rate.poll_interval_seconds = 1;
    config.reports.output_dir = root.join("reports");
    config.logging.enabled = false;
    config
}

fn node(name: &str, status: ConditionStatus, since_minutes: i64) -> NodeInfo {
    let labels: BTreeMap<String, String> = [
        ("agentpool", "spotgen1"),
        ("kubernetes.azure.com/scalesetpriority", "spot"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    NodeInfo {
        name: name.to_string(),
        labels,
        ready: Some(ReadyCondition {
            status,
            last_transition: Some(Utc::now() - ChronoDuration::minutes(since_minutes)),
        }),
    }
}

fn eviction(uid: &str, node: &str) -> ClusterEvent {
    ClusterEvent {
        uid: uid.to_string(),
        reason: "SpotEviction".to_string(),
        message: format!("Node {node} evicted by Azure"),
        involved_kind: "Node".to_string(),
        involved_name: node.to_string(),
        timestamp: Some(Utc::now()),
    }
}

#[test]
fn mixed_suites_produce_the_expected_report_and_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    common::bash_suite(
        &tmp.path().join("bash"),
        &[("EVICT-001", "PASS"), ("EVICT-002", "PASS"), ("EVICT-003", "PASS")],
        0,
    );
    common::python_suite(
        &tmp.path().join("python"),
        &[
            ("test_pdb_001", "passed"),
            ("test_pdb_002", "passed"),
            ("test_pdb_003", "failed"),
        ],
        1,
    );

    let cluster = Arc::new(InMemoryCluster::new("aks-spot-test").with_nodes(vec![
        node("aks-spot-0", ConditionStatus::True, 120),
        node("aks-spot-1", ConditionStatus::True, 120),
    ]));
    let adapter: Arc<dyn ClusterAdapter> = cluster.clone();
    let mut controller =
        RunController::new(config_for(tmp.path()), adapter, EnvOverlay::new()).quiet(true);
    let report = controller.run();

    assert_eq!(report.cluster_name, "aks-spot-test");
    assert_eq!(report.total_tests(), 6);
    assert_eq!(report.passed(), 5);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 0);
    assert_eq!(format!("{:.1}", report.pass_rate()), "83.3");
    assert_eq!(report.exit_code(), 1);

    assert_eq!(report.top_failures().len(), 1);
    assert_eq!(report.top_failures()[0].test_id, "PDB-003");
    assert_eq!(report.top_failures()[0].category, "02-pdb");
    assert_eq!(report.framework_summary()["bash"].passed, 3);
    assert_eq!(report.framework_summary()["python"].failed, 1);
    assert_eq!(report.initial_state.as_ref().map(|s| s.spot_nodes), Some(2));
    assert!(report.final_state.is_some());

    let reports = tmp.path().join("reports");
    let json_path = common::find_json_report(&reports);
    assert!(json_path.with_extension("html").exists());
    assert!(json_path.with_extension("md").exists());

    let reloaded = load_report(&json_path).unwrap();
    assert_eq!(reloaded.total_tests(), 6);
    assert_eq!(reloaded.run_id, report.run_id);
}

#[test]
fn failing_suite_launch_is_recorded_and_later_suites_still_run() {
    let tmp = tempfile::tempdir().unwrap();
    // No bash entrypoint at all.
    fs::create_dir_all(tmp.path().join("bash")).unwrap();
    common::python_suite(&tmp.path().join("python"), &[("test_pdb_001", "passed")], 0);

    let adapter: Arc<dyn ClusterAdapter> = Arc::new(InMemoryCluster::new("ctx"));
    let mut controller =
        RunController::new(config_for(tmp.path()), adapter, EnvOverlay::new()).quiet(true);
    let report = controller.run();

    assert_eq!(report.total_tests(), 2);
    assert_eq!(report.failed(), 1);
    let synthetic = &report.top_failures()[0];
    assert_eq!(synthetic.test_id, "bash-suite");
    assert!(synthetic.error_message.is_some());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn evictions_observed_during_execution_are_reported_once() {
    let tmp = tempfile::tempdir().unwrap();
    common::bash_suite(&tmp.path().join("bash"), &[("EVICT-001", "PASS")], 0);
    let mut config = config_for(tmp.path());
    config.test_suites.python.enabled = false;

    let cluster = Arc::new(InMemoryCluster::new("ctx"));
    cluster.push_event_poll(vec![
        eviction("e1", "aks-spot-0"),
        eviction("e1", "aks-spot-0"),
        eviction("e2", "aks-spot-1"),
    ]);
    let adapter: Arc<dyn ClusterAdapter> = cluster.clone();
    let report = RunController::new(config, adapter, EnvOverlay::new())
        .quiet(true)
        .run();

    let uids: Vec<&str> = report.eviction_events.iter().map(|e| e.uid.as_str()).collect();
    assert_eq!(uids, vec!["e1", "e2"]);
    assert!(cluster.event_poll_count() >= 1);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn remediation_cleans_old_stuck_nodes_and_ghost_instances_only() {
    let tmp = tempfile::tempdir().unwrap();
    common::bash_suite(&tmp.path().join("bash"), &[("EVICT-001", "PASS")], 0);
    let mut config = config_for(tmp.path());
    config.test_suites.python.enabled = false;
    config.remediation.enabled = true;
    config.remediation.stuck_nodes.min_age_minutes = 15;
    config.remediation.vmss_ghosts.min_age_minutes = 10;

    let instance = |id: &str, state: &str, age: i64| ScaleSetInstance {
        scale_set: "aks-spotgen1-vmss".to_string(),
        instance_id: id.to_string(),
        provisioning_state: state.to_string(),
        time_created: Some(Utc::now() - ChronoDuration::minutes(age)),
    };
    let cluster = Arc::new(
        InMemoryCluster::new("ctx")
            .with_nodes(vec![
                node("stuck-old", ConditionStatus::False, 30),
                node("stuck-young", ConditionStatus::Unknown, 2),
                node("healthy", ConditionStatus::True, 300),
            ])
            .with_instances(vec![
                instance("3", "Failed", 45),
                instance("4", "Succeeded", 45),
                instance("5", "Unknown", 1),
            ]),
    );
    let adapter: Arc<dyn ClusterAdapter> = cluster.clone();
    let report = RunController::new(config, adapter, EnvOverlay::new())
        .quiet(true)
        .run();

    let targets: Vec<&str> = report
        .remediation_actions
        .iter()
        .map(|a| a.target.as_str())
        .collect();
    assert_eq!(targets.len(), 2, "actions: {targets:?}");
    assert!(targets.contains(&"aks-spotgen1-vmss/3"));
    assert!(targets.contains(&"stuck-old"));
    assert!(report.remediation_actions.iter().all(|a| a.success));

    let calls = cluster.calls();
    assert!(calls.contains(&RecordedCall::DeleteNode("stuck-old".to_string())));
    assert!(calls.contains(&RecordedCall::DeleteInstance(
        "aks-spotgen1-vmss/3".to_string()
    )));
    assert!(!calls.contains(&RecordedCall::DeleteNode("stuck-young".to_string())));
    assert_eq!(report.remediation_successes(), 2);
}

#[test]
fn unreachable_cluster_runs_no_suite_and_still_reports() {
    let tmp = tempfile::tempdir().unwrap();
    common::bash_suite(&tmp.path().join("bash"), &[("EVICT-001", "PASS")], 0);

    let adapter: Arc<dyn ClusterAdapter> = Arc::new(InMemoryCluster::unreachable());
    let report = RunController::new(config_for(tmp.path()), adapter, EnvOverlay::new())
        .quiet(true)
        .run();

    assert_eq!(report.total_tests(), 0);
    assert!(report.abort_reason.is_some());
    assert_eq!(report.exit_code(), 1);
    assert!(!tmp.path().join("bash").join("results").exists());
    common::find_json_report(&tmp.path().join("reports"));
}
