//! Typed metric samples.
//!
//! A `MetricSample` is constructed immediately before a push and never
//! stored afterwards; the Pushgateway owns all durable metric state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket bounds for `time_to_deploy_seconds` (seconds, `+Inf` implied).
///
/// Fixed for dashboard compatibility.
pub const DEPLOY_DURATION_BUCKETS: [f64; 7] =
    [60.0, 300.0, 600.0, 900.0, 1200.0, 1500.0, 1800.0];

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
}

impl MetricKind {
    /// Type name as it appears on the `# TYPE` line.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// One observation destined for the Pushgateway.
///
/// Labels are kept in a `BTreeMap` so rendered output is deterministic.
/// Histogram samples carry their bucket bounds; for gauges and counters
/// `buckets` stays empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name (`deployment_stage_duration_seconds`, ...).
    pub name: String,

    /// Label key/value pairs.
    pub labels: BTreeMap<String, String>,

    /// Observed value.
    pub value: f64,

    /// Metric type, emitted on the `# TYPE` line.
    pub kind: MetricKind,

    /// Description, emitted on the `# HELP` line.
    pub help: String,

    /// Upper bucket bounds for histograms (empty otherwise).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<f64>,
}

impl MetricSample {
    /// Create a gauge sample.
    pub fn gauge(name: &str, help: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            value,
            kind: MetricKind::Gauge,
            help: help.to_string(),
            buckets: Vec::new(),
        }
    }

    /// Create a counter sample.
    pub fn counter(name: &str, help: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            value,
            kind: MetricKind::Counter,
            help: help.to_string(),
            buckets: Vec::new(),
        }
    }

    /// Create a histogram sample for a single observation.
    pub fn histogram(name: &str, help: &str, value: f64, buckets: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            value,
            kind: MetricKind::Histogram,
            help: help.to_string(),
            buckets: buckets.to_vec(),
        }
    }

    /// Attach a label.
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}
