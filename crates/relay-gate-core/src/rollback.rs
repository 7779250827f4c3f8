//! Rollback control.
//!
//! This component decides nothing about infrastructure: the actual revert
//! (git revert, platform redeploy) is an injected action supplied by the
//! caller. It times the action, records the outcome counter, and escalates
//! a failed rollback to an error-level log — that state needs a human.

use crate::context::DeploymentContext;
use crate::metric::{MetricSample, MetricSink};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Why a rollback was triggered. Reasons are mutually exclusive per
/// invocation and never blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    GateFailed,
    HealthCheckFailed,
    Manual,
}

impl RollbackReason {
    /// `reason` label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackReason::GateFailed => "gate_failed",
            RollbackReason::HealthCheckFailed => "health_check_failed",
            RollbackReason::Manual => "manual",
        }
    }
}

impl std::str::FromStr for RollbackReason {
    type Err = crate::GateError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "gate_failed" => Ok(RollbackReason::GateFailed),
            "health_check_failed" => Ok(RollbackReason::HealthCheckFailed),
            "manual" => Ok(RollbackReason::Manual),
            other => Err(crate::GateError::invalid(
                "rollback reason",
                format!("expected gate_failed|health_check_failed|manual, got {other:?}"),
            )),
        }
    }
}

/// Terminal state of a rollback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Succeeded,
    Failed,
}

impl RollbackStatus {
    /// `status` label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStatus::Succeeded => "success",
            RollbackStatus::Failed => "failure",
        }
    }
}

/// Result of one rollback invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub reason: RollbackReason,
    pub status: RollbackStatus,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl RollbackOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RollbackStatus::Succeeded
    }
}

/// Thin decision + telemetry wrapper around an injected rollback action.
pub struct RollbackController {
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    job: String,
}

impl RollbackController {
    pub fn new(ctx: DeploymentContext, sink: Arc<dyn MetricSink>, job: &str) -> Self {
        Self {
            ctx,
            sink,
            job: job.to_string(),
        }
    }

    /// Execute `perform` and record the outcome.
    ///
    /// The counter sample is pushed whether the action succeeded or not;
    /// delivery failure is downgraded to a warning. A failed rollback is
    /// logged at error level: this system cannot recover from it.
    pub async fn rollback<F, Fut, E>(&self, reason: RollbackReason, perform: F) -> RollbackOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        info!(reason = reason.as_str(), "rollback triggered");
        let started = Instant::now();

        let (status, error) = match perform().await {
            Ok(()) => (RollbackStatus::Succeeded, None),
            Err(e) => (RollbackStatus::Failed, Some(e.to_string())),
        };
        let duration_seconds = started.elapsed().as_secs_f64();

        match status {
            RollbackStatus::Succeeded => {
                info!(reason = reason.as_str(), duration_seconds, "rollback succeeded");
            }
            RollbackStatus::Failed => {
                error!(
                    reason = reason.as_str(),
                    duration_seconds,
                    error = error.as_deref().unwrap_or("unknown"),
                    "rollback failed, manual intervention required",
                );
            }
        }

        let sample = MetricSample::counter("deployment_rollback_total", "Rollback attempts", 1.0)
            .label("reason", reason.as_str())
            .label("status", status.as_str())
            .label("environment", self.ctx.environment.as_str())
            .label("deployment_id", &self.ctx.deployment_id);

        if let Err(e) = self
            .sink
            .push(&self.job, &self.ctx.deployment_id, &[sample])
            .await
        {
            warn!(error = %e, "rollback metric delivery failed, continuing");
        }

        RollbackOutcome {
            reason,
            status,
            duration_seconds,
            error,
        }
    }
}
