//! Pushgateway delivery.
//!
//! The `MetricSink` trait is the seam between recorders and the network;
//! production uses `PushgatewayClient`, tests use `fakes::MemorySink`.
//! Delivery is best-effort: callers downgrade a `PushError` to a warning
//! and keep the pipeline moving.

use crate::error::{GateError, PushError, Result};
use crate::metric::exposition;
use crate::metric::sample::MetricSample;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};

/// Sentinel URL value that turns pushes into no-ops.
pub const DISABLED_SENTINEL: &str = "disabled";

/// Pushgateway client configuration.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Pushgateway base URL. Empty or `"disabled"` disables delivery.
    pub url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry schedule for transient failures.
    pub retry: RetryPolicy,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9091".to_string(),
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

impl PushConfig {
    /// Read `PUSHGATEWAY_URL` (default `http://localhost:9091`). Called once,
    /// at the CLI boundary.
    pub fn from_env() -> Self {
        let url = std::env::var("PUSHGATEWAY_URL")
            .unwrap_or_else(|_| "http://localhost:9091".to_string());
        Self {
            url,
            ..Self::default()
        }
    }

    /// Whether pushes are disabled via the sentinel (or an empty URL).
    pub fn is_disabled(&self) -> bool {
        self.url.is_empty() || self.url == DISABLED_SENTINEL
    }
}

/// Destination for metric samples.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Deliver `samples` under the grouping key `job`/`instance`.
    ///
    /// `job` and `instance` must be non-empty and `samples` must not be
    /// empty; violations are caller bugs and fail loud.
    async fn push(&self, job: &str, instance: &str, samples: &[MetricSample]) -> Result<()>;
}

/// Real Pushgateway client.
pub struct PushgatewayClient {
    config: PushConfig,
    http: reqwest::Client,
}

enum AttemptError {
    Net(reqwest::Error),
    Status(u16),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Net(e) => write!(f, "{}", e),
            AttemptError::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

impl PushgatewayClient {
    /// Create a client. The underlying HTTP client is built once and reused.
    pub fn new(config: PushConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("relay-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        Self { config, http }
    }

    /// Create a client from `PUSHGATEWAY_URL`.
    pub fn from_env() -> Self {
        Self::new(PushConfig::from_env())
    }

    fn push_url(&self, job: &str, instance: &str) -> String {
        format!(
            "{}/metrics/job/{}/instance/{}",
            self.config.url.trim_end_matches('/'),
            job,
            instance
        )
    }
}

#[async_trait]
impl MetricSink for PushgatewayClient {
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

        if self.config.is_disabled() {
            trace!(job, instance, "pushgateway disabled, skipping push");
            return Ok(());
        }

        let url = self.push_url(job, instance);
        let body = exposition::render(samples);

        let outcome = self
            .config
            .retry
            .run("pushgateway_push", || {
                let request = self
                    .http
                    .post(&url)
                    .header("Content-Type", "text/plain; version=0.0.4")
                    .body(body.clone());
                async move {
                    let response = request.send().await.map_err(AttemptError::Net)?;
                    if response.status().is_success() {
                        Ok(())
                    } else {
                        Err(AttemptError::Status(response.status().as_u16()))
                    }
                }
            })
            .await;

        match outcome {
            Ok(()) => {
                debug!(job, instance, samples = samples.len(), "pushed metrics");
                Ok(())
            }
            Err((attempts, AttemptError::Net(source))) => {
                Err(GateError::Push(PushError::Exhausted { attempts, source }))
            }
            Err((attempts, AttemptError::Status(status))) => {
                Err(GateError::Push(PushError::Rejected { attempts, status }))
            }
        }
    }
}
