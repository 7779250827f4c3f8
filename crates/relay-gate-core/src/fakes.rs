//! In-memory fakes for the metric sink (testing only)
//!
//! Provides `MemorySink`, which satisfies the `MetricSink` contract without
//! any network, and `FailingSink`, which always reports delivery failure.

use crate::error::{GateError, PushError, Result};
use crate::metric::{MetricSample, MetricSink};
use async_trait::async_trait;
use std::sync::Mutex;

/// One recorded push: grouping key plus the samples delivered.
#[derive(Debug, Clone)]
pub struct RecordedPush {
    pub job: String,
    pub instance: String,
    pub samples: Vec<MetricSample>,
}

/// In-memory sink that records every push.
#[derive(Debug, Default)]
pub struct MemorySink {
    pushes: Mutex<Vec<RecordedPush>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All pushes recorded so far, in delivery order.
    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.pushes.lock().unwrap().clone()
    }

    /// Every sample across all pushes, flattened in delivery order.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.samples.clone())
            .collect()
    }

    /// Number of pushes recorded.
    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn push(&self, job: &str, instance: &str, samples: &[MetricSample]) -> Result<()> {
        if job.is_empty() {
            return Err(GateError::invalid("push", "job must not be empty"));
        }
        if instance.is_empty() {
            return Err(GateError::invalid("push", "instance must not be empty"));
        }
        if samples.is_empty() {
            return Err(GateError::invalid("push", "samples must not be empty"));
        }

        self.pushes.lock().unwrap().push(RecordedPush {
            job: job.to_string(),
            instance: instance.to_string(),
            samples: samples.to_vec(),
        });
        Ok(())
    }
}

/// Sink that fails every push, for exercising soft-fail paths.
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl MetricSink for FailingSink {
    async fn push(&self, _job: &str, _instance: &str, _samples: &[MetricSample]) -> Result<()> {
        Err(GateError::Push(PushError::Rejected {
            attempts: 3,
            status: 503,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let a = vec![MetricSample::gauge("deployment_in_progress", "Running", 1.0)];
        let b = vec![MetricSample::gauge("deployment_in_progress", "Running", 0.0)];

        sink.push("relay_deploy", "d1", &a).await.expect("push a");
        sink.push("relay_deploy", "d1", &b).await.expect("push b");

        let pushes = sink.pushes();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].samples[0].value, 1.0);
        assert_eq!(pushes[1].samples[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_memory_sink_validates_like_real_sink() {
        let sink = MemorySink::new();
        assert!(sink.push("", "i", &[]).await.is_err());
        assert_eq!(sink.push_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_sink_always_errors() {
        let sink = FailingSink;
        let samples = vec![MetricSample::gauge("deployment_in_progress", "Running", 1.0)];
        assert!(sink.push("j", "i", &samples).await.is_err());
    }
}
