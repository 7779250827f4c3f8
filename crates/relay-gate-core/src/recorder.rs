//! Stage recorder: times deployment stages and emits the lifecycle metric
//! catalogue through a `MetricSink`.
//!
//! Recording is not deduplicated: calling `record_stage` twice emits two
//! independent samples, matching gauge/counter semantics downstream.
//! Delivery failures are downgraded to warnings — telemetry is
//! observability, never control flow. Argument violations (empty stage or
//! service names) are caller bugs and fail loud without emitting anything.

use crate::context::DeploymentContext;
use crate::error::{GateError, Result};
use crate::metric::{MetricSample, MetricSink, DEPLOY_DURATION_BUCKETS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of a stage or check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
}

impl StageStatus {
    /// Label value on every status-bearing series.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
        }
    }
}

impl FromStr for StageStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(StageStatus::Success),
            "failure" => Ok(StageStatus::Failure),
            other => Err(GateError::invalid(
                "status",
                format!("expected success|failure, got {other:?}"),
            )),
        }
    }
}

/// One completed stage. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_name: String,
    pub service: String,
    pub status: StageStatus,
    pub duration_seconds: f64,
    pub error_type: Option<String>,
}

/// Times deployment stages and pushes lifecycle samples.
pub struct StageRecorder {
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    job: String,
    starts: HashMap<(String, String), Instant>,
    records: Vec<StageRecord>,
}

impl StageRecorder {
    /// Create a recorder pushing under `job`, keyed per-run by the
    /// context's deployment id.
    pub fn new(ctx: DeploymentContext, sink: Arc<dyn MetricSink>, job: &str) -> Result<Self> {
        if job.is_empty() {
            return Err(GateError::invalid("StageRecorder::new", "job must not be empty"));
        }
        Ok(Self {
            ctx,
            sink,
            job: job.to_string(),
            starts: HashMap::new(),
            records: Vec::new(),
        })
    }

    /// The append-only log of completed stages, in recording order.
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Mark a stage as running; a later `record_stage` without an explicit
    /// duration measures from this point.
    pub fn stage_start(&mut self, stage: &str, service: &str) {
        self.starts
            .insert((stage.to_string(), service.to_string()), Instant::now());
        info!(stage, service, "stage started");
    }

    /// Record a completed stage.
    ///
    /// Emits `deployment_stage_duration_seconds`, plus
    /// `deployment_errors_total` when the stage failed with a known error
    /// type. Duration resolution: an explicit non-zero value wins; otherwise
    /// the elapsed time since the matching `stage_start`; otherwise 0.
    pub async fn record_stage(
        &mut self,
        stage: &str,
        service: &str,
        status: StageStatus,
        duration: Option<f64>,
        error_type: Option<&str>,
    ) -> Result<()> {
        if stage.is_empty() || service.is_empty() {
            error!(stage, service, "record_stage called without stage/service");
            return Err(GateError::invalid(
                "record_stage",
                "stage and service must not be empty",
            ));
        }

        let key = (stage.to_string(), service.to_string());
        let measured = match duration {
            Some(d) if d != 0.0 => d,
            _ => match self.starts.remove(&key) {
                Some(start) => start.elapsed().as_secs_f64(),
                None => duration.unwrap_or(0.0),
            },
        };
        let duration_seconds = if measured < 0.0 {
            warn!(stage, service, duration = measured, "negative stage duration clamped to 0");
            0.0
        } else {
            measured
        };

        let mut samples = vec![self.with_run_labels(
            MetricSample::gauge(
                "deployment_stage_duration_seconds",
                "Duration of a deployment stage",
                duration_seconds,
            )
            .label("stage", stage)
            .label("service", service)
            .label("status", status.as_str()),
        )];

        if status == StageStatus::Failure {
            if let Some(error_type) = error_type {
                samples.push(self.with_run_labels(
                    MetricSample::counter(
                        "deployment_errors_total",
                        "Deployment errors by stage and type",
                        1.0,
                    )
                    .label("stage", stage)
                    .label("service", service)
                    .label("error_type", error_type),
                ));
            }
        }

        self.records.push(StageRecord {
            stage_name: stage.to_string(),
            service: service.to_string(),
            status,
            duration_seconds,
            error_type: error_type.map(str::to_string),
        });

        info!(stage, service, status = status.as_str(), duration_seconds, "stage recorded");
        self.emit(samples).await;
        Ok(())
    }

    /// Record an API health check observation.
    pub async fn record_health_check(
        &mut self,
        endpoint: &str,
        status: StageStatus,
        latency_ms: f64,
    ) -> Result<()> {
        if endpoint.is_empty() {
            return Err(GateError::invalid("record_health_check", "endpoint must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::gauge(
                "api_health_check_latency_ms",
                "API health check latency",
                latency_ms.max(0.0),
            )
            .label("status", status.as_str())
            .label("endpoint", endpoint),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    /// Record one applied (or failed) database migration.
    pub async fn record_migration(&mut self, migration_name: &str, status: StageStatus) -> Result<()> {
        if migration_name.is_empty() {
            return Err(GateError::invalid("record_migration", "migration_name must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::counter("migration_total", "Database migrations applied", 1.0)
                .label("migration_name", migration_name)
                .label("status", status.as_str()),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    /// Record how far migrations lag behind the deployed code.
    pub async fn record_migration_lag(&mut self, migration_count: u32, lag_seconds: f64) {
        let count = migration_count.to_string();
        let sample = self.with_run_labels(
            MetricSample::gauge(
                "database_migration_lag_seconds",
                "Time pending migrations have waited",
                lag_seconds.max(0.0),
            )
            .label("migration_count", &count),
        );
        self.emit(vec![sample]).await;
    }

    /// Record one smoke test outcome.
    pub async fn record_smoke_test(&mut self, test_name: &str, status: StageStatus) -> Result<()> {
        if test_name.is_empty() {
            return Err(GateError::invalid("record_smoke_test", "test_name must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::counter("smoke_test_total", "Post-deploy smoke test outcomes", 1.0)
                .label("test_name", test_name)
                .label("status", status.as_str()),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    /// Flag the deployment as in progress (gauge 1).
    pub async fn deployment_started(&mut self) {
        let sample = self.in_progress_sample(1.0);
        self.emit(vec![sample]).await;
    }

    /// Clear the in-progress flag and observe the total deploy duration.
    pub async fn deployment_finished(&mut self, total_seconds: f64) {
        let samples = vec![
            self.in_progress_sample(0.0),
            MetricSample::histogram(
                "time_to_deploy_seconds",
                "End-to-end deploy duration",
                total_seconds.max(0.0),
                &DEPLOY_DURATION_BUCKETS,
            ),
        ];
        self.emit(samples).await;
    }

    /// Record the post-deploy error rate for a service.
    pub async fn record_error_rate(&mut self, service: &str, rate: f64) -> Result<()> {
        if service.is_empty() {
            return Err(GateError::invalid("record_error_rate", "service must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::gauge(
                "post_deployment_error_rate",
                "Error rate observed after deploy",
                rate,
            )
            .label("service", service),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    /// Record the infrastructure cost attributed to a resource.
    pub async fn record_infra_cost(&mut self, resource: &str, cost: f64) -> Result<()> {
        if resource.is_empty() {
            return Err(GateError::invalid("record_infra_cost", "resource must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::gauge(
                "deployment_infrastructure_cost",
                "Infrastructure cost per resource",
                cost,
            )
            .label("resource", resource),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    /// Record a rollback attempt outcome.
    pub async fn record_rollback(&mut self, reason: &str, status: StageStatus) -> Result<()> {
        if reason.is_empty() {
            return Err(GateError::invalid("record_rollback", "reason must not be empty"));
        }
        let sample = self.with_run_labels(
            MetricSample::counter("deployment_rollback_total", "Rollback attempts", 1.0)
                .label("reason", reason)
                .label("status", status.as_str()),
        );
        self.emit(vec![sample]).await;
        Ok(())
    }

    fn in_progress_sample(&self, value: f64) -> MetricSample {
        self.with_run_labels(
            MetricSample::gauge(
                "deployment_in_progress",
                "Whether a deployment is running (1) or done (0)",
                value,
            )
            .label("branch", &self.ctx.branch)
            .label("triggered_by", &self.ctx.triggered_by),
        )
    }

    fn with_run_labels(&self, sample: MetricSample) -> MetricSample {
        sample
            .label("environment", self.ctx.environment.as_str())
            .label("deployment_id", &self.ctx.deployment_id)
    }

    /// Best-effort delivery; a push failure is a warning, never an error.
    async fn emit(&self, samples: Vec<MetricSample>) {
        if let Err(e) = self
            .sink
            .push(&self.job, &self.ctx.deployment_id, &samples)
            .await
        {
            warn!(error = %e, "metric delivery failed, continuing");
        }
    }
}
