//! Relay Gate Core - deployment gating and telemetry
//!
//! Provides the building blocks of the staging deployment gate:
//! - Serializes deployment lifecycle metrics to Prometheus exposition text
//!   and pushes them to a Pushgateway (best-effort, with retry)
//! - Times and records deployment stages (build, migrate, deploy, smoke-test)
//! - Runs the ordered probe battery against a staging host and aggregates
//!   a single approve/block verdict
//! - Wraps platform rollback actions with timing and telemetry

pub mod context;
pub mod error;
pub mod fakes;
pub mod gate;
pub mod metric;
pub mod probe;
pub mod recorder;
pub mod retry;
pub mod rollback;
pub mod runner;
pub mod telemetry;

// Re-export key types
pub use context::{DeploymentContext, Environment};
pub use error::{GateError, PushError, Result};
pub use gate::{GateStatus, GateSummary, ProbeResult};
pub use metric::{MetricKind, MetricSample, MetricSink, PushConfig, PushgatewayClient};
pub use probe::{GateConfig, SessionState};
pub use recorder::{StageRecorder, StageStatus};
pub use rollback::{RollbackController, RollbackOutcome, RollbackReason, RollbackStatus};
pub use runner::{CancelFlag, GateRunner};
pub use telemetry::init_tracing;
