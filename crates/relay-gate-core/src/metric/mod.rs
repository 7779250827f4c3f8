//! Deployment metrics: typed samples, Prometheus exposition text, and
//! Pushgateway delivery.

pub mod exposition;
pub mod push;
pub mod sample;

pub use push::{MetricSink, PushConfig, PushgatewayClient};
pub use sample::{MetricKind, MetricSample, DEPLOY_DURATION_BUCKETS};
