//! Error taxonomy for the deployment gate.
//!
//! Configuration errors fail loud (they indicate an integration bug);
//! metric delivery errors fail soft (callers downgrade them to warnings).

/// Error returned when a Pushgateway delivery ultimately fails.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("pushgateway unreachable after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("pushgateway rejected push after {attempts} attempt(s): HTTP {status}")]
    Rejected { attempts: u32, status: u16 },
}

impl PushError {
    /// Number of delivery attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            PushError::Exhausted { attempts, .. } => *attempts,
            PushError::Rejected { attempts, .. } => *attempts,
        }
    }
}

/// Deployment gate errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid argument for {operation}: {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("metric push failed: {0}")]
    Push(#[from] PushError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gate run interrupted after {completed} of {total} probes")]
    Interrupted { completed: usize, total: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Shorthand for a caller-contract violation on `operation`.
    pub fn invalid(operation: &str, reason: impl Into<String>) -> Self {
        GateError::InvalidArgument {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
