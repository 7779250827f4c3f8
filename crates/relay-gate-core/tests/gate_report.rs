//! Integration tests for the gate pipeline with MemorySink.

use relay_gate_core::fakes::MemorySink;
use relay_gate_core::metric::exposition;
use relay_gate_core::{
    DeploymentContext, Environment, GateStatus, GateSummary, MetricSink, ProbeResult,
    RollbackController, RollbackReason, StageRecorder, StageStatus,
};
use std::sync::Arc;

fn staging_ctx() -> DeploymentContext {
    DeploymentContext::new("1718000000", Environment::Staging, "r0.5", "ci")
}

/// Test: a full deployment recording cycle lands every expected series in
/// the sink, in emission order.
#[tokio::test]
async fn test_deployment_lifecycle_emits_expected_series() {
    let sink = Arc::new(MemorySink::new());
    let mut recorder =
        StageRecorder::new(staging_ctx(), sink.clone(), "relay_deploy").expect("recorder");

    recorder.deployment_started().await;
    recorder
        .record_stage("build", "api", StageStatus::Success, Some(184.0), None)
        .await
        .expect("build stage");
    recorder
        .record_migration("0042_add_quota_table", StageStatus::Success)
        .await
        .expect("migration");
    recorder
        .record_stage("migrate", "db", StageStatus::Success, Some(9.5), None)
        .await
        .expect("migrate stage");
    recorder
        .record_smoke_test("stream_roundtrip", StageStatus::Success)
        .await
        .expect("smoke test");
    recorder.deployment_finished(640.0).await;

    let names: Vec<String> = sink.samples().iter().map(|s| s.name.clone()).collect();
    assert_eq!(
        names,
        vec![
            "deployment_in_progress",
            "deployment_stage_duration_seconds",
            "migration_total",
            "deployment_stage_duration_seconds",
            "smoke_test_total",
            "deployment_in_progress",
            "time_to_deploy_seconds",
        ]
    );

    // Every push used the deployment id as the grouping instance.
    for push in sink.pushes() {
        assert_eq!(push.job, "relay_deploy");
        assert_eq!(push.instance, "1718000000");
    }

    // The recorder's own log preserved stage order.
    let stages: Vec<&str> = recorder.records().iter().map(|r| r.stage_name.as_str()).collect();
    assert_eq!(stages, vec!["build", "migrate"]);
}

/// Test: the pushed sample set renders to valid exposition text with one
/// HELP/TYPE pair per series.
#[tokio::test]
async fn test_recorded_samples_render_to_exposition_text() {
    let sink = Arc::new(MemorySink::new());
    let mut recorder =
        StageRecorder::new(staging_ctx(), sink.clone(), "relay_deploy").expect("recorder");

    recorder
        .record_stage("deploy", "api", StageStatus::Success, Some(92.0), None)
        .await
        .expect("deploy stage");
    recorder
        .record_stage("deploy", "worker", StageStatus::Failure, Some(31.0), Some("oom"))
        .await
        .expect("deploy stage");

    let text = exposition::render(&sink.samples());
    assert_eq!(text.matches("# HELP deployment_stage_duration_seconds").count(), 1);
    assert_eq!(text.matches("# TYPE deployment_stage_duration_seconds gauge").count(), 1);
    assert_eq!(text.matches("deployment_stage_duration_seconds{").count(), 2);
    assert!(text.contains("deployment_errors_total{"));
    assert!(text.contains("error_type=\"oom\""));
}

/// Test: gate verdict plus rollback on block, end to end against the fake
/// sink.
#[tokio::test]
async fn test_blocked_gate_drives_rollback_recording() {
    let results = vec![
        ProbeResult::pass(1, "unauthenticated stream request is rejected", "HTTP 401", 401, "HTTP 401"),
        ProbeResult::fail(2, "anonymous session token issued", "well-formed session token", 500, "HTTP 500"),
    ];
    let summary = GateSummary::from_results(&results);
    assert_eq!(summary.overall_status, GateStatus::Blocked);

    let sink = Arc::new(MemorySink::new());
    let controller = RollbackController::new(staging_ctx(), sink.clone(), "relay_deploy");

    let outcome = controller
        .rollback(RollbackReason::GateFailed, || async { Ok::<(), String>(()) })
        .await;

    assert!(outcome.succeeded());
    let samples = sink.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "deployment_rollback_total");
    assert_eq!(samples[0].labels["reason"], "gate_failed");
}

/// Test: the JSON report written to disk round-trips with verdict intact.
#[tokio::test]
async fn test_gate_report_roundtrips_through_json_file() {
    let results = vec![
        ProbeResult::pass(1, "unauthenticated stream request is rejected", "HTTP 401", 401, "HTTP 401"),
        ProbeResult::fail(6, "oversized message rejected", "HTTP 422 or 413", 200, "HTTP 200"),
    ];
    let report = relay_gate_core::gate::GateReport {
        run_id: "run-report-test".to_string(),
        host: "https://staging.relay.dev".to_string(),
        summary: GateSummary::from_results(&results),
        results,
        interrupted: false,
    };

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gate-report.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&report).expect("serialize")).expect("write");

    let raw = std::fs::read_to_string(&path).expect("read");
    let parsed: relay_gate_core::gate::GateReport = serde_json::from_str(&raw).expect("parse");
    assert_eq!(parsed.summary.overall_status, GateStatus::Blocked);
    assert_eq!(parsed.summary.failed_count, 1);
    assert_eq!(parsed.results[1].actual, "HTTP 200");
}

/// Test: direct sink misuse is rejected the same way the real client
/// rejects it.
#[tokio::test]
async fn test_sink_contract_on_empty_push() {
    let sink = MemorySink::new();
    assert!(sink.push("relay_deploy", "1718000000", &[]).await.is_err());
    assert_eq!(sink.push_count(), 0);
}
