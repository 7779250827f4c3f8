//! Gate run orchestration.
//!
//! Probes run strictly in order because later probes consume session state
//! established by earlier ones. A probe failure never halts the run — every
//! probe executes and the verdict is decided afterwards, so one invocation
//! yields the full diagnostic picture. The run can be abandoned between
//! probes via a `CancelFlag`; an interrupted run is always Blocked.

use crate::gate::{GateReport, GateStatus, GateSummary, ProbeResult};
use crate::probe::{GateConfig, ProbeExecutor, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Cooperative cancellation signal for a gate run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abandonment; the runner stops before the next probe.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the ordered probe battery and aggregates the verdict.
pub struct GateRunner {
    host: String,
    executor: ProbeExecutor,
}

/// Number of probes in the battery.
pub const PROBE_COUNT: usize = 8;

impl GateRunner {
    pub fn new(host: &str, config: GateConfig) -> crate::Result<Self> {
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            executor: ProbeExecutor::new(host, config)?,
        })
    }

    /// Execute all probes in order and produce the report.
    pub async fn run(&self, cancel: &CancelFlag) -> GateReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, host = %self.host, "starting gate run");

        let mut state = SessionState::default();
        let mut results: Vec<ProbeResult> = Vec::with_capacity(PROBE_COUNT);
        let mut interrupted = false;

        for step in 1..=PROBE_COUNT as u32 {
            if cancel.is_cancelled() {
                warn!(completed = results.len(), total = PROBE_COUNT, "gate run interrupted");
                interrupted = true;
                break;
            }

            let result = match step {
                1 => self.executor.probe_auth_required().await,
                2 => self.executor.probe_session_issuance(&mut state).await,
                3 => self.executor.probe_streaming(&mut state).await,
                4 => self.executor.probe_quota(&mut state).await,
                5 => self.executor.probe_rate_limit_burst(&mut state).await,
                6 => self.executor.probe_oversized_payload(&mut state).await,
                7 => self.executor.probe_model_allow_list(&mut state).await,
                8 => self.executor.probe_retry_after(&mut state).await,
                _ => unreachable!("probe battery has {PROBE_COUNT} steps"),
            };

            info!(
                probe = result.probe_id,
                passed = result.passed,
                status = result.actual_http_status,
                "{}",
                result.description,
            );
            results.push(result);
        }

        let mut summary = GateSummary::from_results(&results);
        if interrupted {
            // A partial run is never treated as approved.
            summary.overall_status = GateStatus::Blocked;
        }

        info!(
            run_id = %run_id,
            status = summary.overall_status.as_str(),
            passed = summary.passed_count,
            failed = summary.failed_count,
            requests_used = state.requests_used,
            "gate run finished",
        );

        GateReport {
            run_id,
            host: self.host.clone(),
            results,
            summary,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_roundtrip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_blocked_with_no_results() {
        let runner =
            GateRunner::new("https://staging.relay.dev", GateConfig::default()).expect("runner");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = runner.run(&cancel).await;
        assert!(report.interrupted);
        assert!(report.results.is_empty());
        assert_eq!(report.summary.overall_status, GateStatus::Blocked);
    }

    #[tokio::test]
    async fn test_unreachable_host_runs_all_probes_and_blocks() {
        // TEST-NET-1 address: every probe fails fast with a transport error,
        // but the run-all-then-decide policy still reports all eight.
        let config = GateConfig {
            hourly_quota: 1,
            burst_limit: 1,
            probe_timeout: std::time::Duration::from_millis(200),
            ..GateConfig::default()
        };
        let runner = GateRunner::new("http://192.0.2.1:9", config).expect("runner");

        let report = runner.run(&CancelFlag::new()).await;
        assert!(!report.interrupted);
        assert_eq!(report.results.len(), PROBE_COUNT);
        assert_eq!(report.summary.overall_status, GateStatus::Blocked);
        assert_eq!(report.summary.failed_count, PROBE_COUNT);

        // Execution order is preserved in the report.
        let ids: Vec<u32> = report.results.iter().map(|r| r.probe_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        // Probes behind the session dependency name the missing token.
        assert!(report.results[2].actual.contains("no session token"));
    }
}
