//! Deployment run identity.
//!
//! One `DeploymentContext` is built at process start and passed by reference
//! into every component. Environment variables are read here and nowhere
//! else; business logic never touches ambient process state.

use serde::{Deserialize, Serialize};

/// Target environment of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    /// Label value used on every metric series.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Parse from an `ENVIRONMENT` value. Unknown values fall back to
    /// production, matching the deploy tooling's default.
    pub fn parse(value: &str) -> Self {
        match value {
            "staging" => Environment::Staging,
            _ => Environment::Production,
        }
    }
}

/// Immutable identity of one deployment pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// Unique id for this run (defaults to the unix timestamp at startup).
    pub deployment_id: String,

    /// Environment being deployed to.
    pub environment: Environment,

    /// Git branch being deployed.
    pub branch: String,

    /// Who or what kicked off the run (CI job, operator handle).
    pub triggered_by: String,
}

impl DeploymentContext {
    /// Build a context with an explicit id.
    pub fn new(
        deployment_id: impl Into<String>,
        environment: Environment,
        branch: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            environment,
            branch: branch.into(),
            triggered_by: triggered_by.into(),
        }
    }

    /// Build a context from `DEPLOYMENT_ID`, `ENVIRONMENT`, `BRANCH` and
    /// `TRIGGERED_BY`. Called once, at the CLI boundary.
    pub fn from_env() -> Self {
        let deployment_id = std::env::var("DEPLOYMENT_ID")
            .unwrap_or_else(|_| chrono::Utc::now().timestamp().to_string());
        let environment = std::env::var("ENVIRONMENT")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Production);
        let branch = std::env::var("BRANCH").unwrap_or_default();
        let triggered_by = std::env::var("TRIGGERED_BY").unwrap_or_default();

        Self {
            deployment_id,
            environment,
            branch,
            triggered_by,
        }
    }
}
