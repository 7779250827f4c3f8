//! Gate verdict: probe results, aggregation, and the operator report.

use serde::{Deserialize, Serialize};

/// Aggregate go/no-go decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Approved,
    Blocked,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Approved => "approved",
            GateStatus::Blocked => "blocked",
        }
    }
}

/// Outcome of a single probe against the staging host.
///
/// `passed` is exactly the probe's status predicate applied to the observed
/// response; construction sites keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 1-based position in the probe battery.
    pub probe_id: u32,

    /// What the probe checks.
    pub description: String,

    /// Expected observation, human-readable.
    pub expected: String,

    /// HTTP status actually observed (0 when no response was obtained).
    pub actual_http_status: u16,

    /// Actual observation, human-readable.
    pub actual: String,

    /// Whether the observation matched the expectation.
    pub passed: bool,
}

impl ProbeResult {
    pub fn pass(probe_id: u32, description: &str, expected: &str, status: u16, actual: impl Into<String>) -> Self {
        Self {
            probe_id,
            description: description.to_string(),
            expected: expected.to_string(),
            actual_http_status: status,
            actual: actual.into(),
            passed: true,
        }
    }

    pub fn fail(probe_id: u32, description: &str, expected: &str, status: u16, actual: impl Into<String>) -> Self {
        Self {
            probe_id,
            description: description.to_string(),
            expected: expected.to_string(),
            actual_http_status: status,
            actual: actual.into(),
            passed: false,
        }
    }

    /// One report line: `PASS`/`FAIL`, id, description, and for failures the
    /// expected-vs-actual detail an operator needs without re-running.
    pub fn report_line(&self) -> String {
        if self.passed {
            format!("PASS  [{}] {}", self.probe_id, self.description)
        } else {
            format!(
                "FAIL  [{}] {} — expected {}, got {}",
                self.probe_id, self.description, self.expected, self.actual
            )
        }
    }
}

/// Aggregate over the full ordered probe run.
///
/// Derived, never constructed independently: `Approved` iff every probe
/// passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSummary {
    pub total_probes: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub overall_status: GateStatus,
}

impl GateSummary {
    /// Compute the summary from an ordered result list.
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let passed_count = results.iter().filter(|r| r.passed).count();
        let failed_count = results.len() - passed_count;
        let overall_status = if failed_count == 0 {
            GateStatus::Approved
        } else {
            GateStatus::Blocked
        };

        Self {
            total_probes: results.len(),
            passed_count,
            failed_count,
            overall_status,
        }
    }

    pub fn approved(&self) -> bool {
        self.overall_status == GateStatus::Approved
    }
}

/// Full gate run output: ordered results plus the derived summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    /// Unique id of this gate run, threaded through logs and telemetry.
    pub run_id: String,

    /// Host the battery ran against.
    pub host: String,

    /// Results in execution order.
    pub results: Vec<ProbeResult>,

    /// Derived verdict.
    pub summary: GateSummary,

    /// True when the run was abandoned before all probes executed. An
    /// interrupted run is always Blocked.
    pub interrupted: bool,
}

impl GateReport {
    /// Render the per-probe lines plus the final summary count.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&result.report_line());
            out.push('\n');
        }
        if self.interrupted {
            out.push_str("gate run interrupted before completion\n");
        }
        out.push_str(&format!(
            "{}: {} passed, {} failed of {} probes\n",
            self.summary.overall_status.as_str(),
            self.summary.passed_count,
            self.summary.failed_count,
            self.summary.total_probes,
        ));
        out
    }
}
