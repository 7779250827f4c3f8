//! Relay Gate - staging validation and deployment telemetry CLI
//!
//! The `relay-gate` command gates a deploy on staging behaviour and pushes
//! lifecycle metrics to the Pushgateway.
//!
//! ## Commands
//!
//! - `validate`: run the full probe battery against a staging host
//! - `record-stage`: push one deployment stage sample (CI glue)
//! - `health-check`: timed endpoint check, recorded as a latency sample
//! - `rollback`: run a platform rollback command under telemetry
//!
//! Environment is read here and nowhere else: `PUSHGATEWAY_URL`,
//! `DEPLOYMENT_ID`, `ENVIRONMENT`, `BRANCH`, `TRIGGERED_BY`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_gate_core::{
    CancelFlag, DeploymentContext, GateConfig, GateRunner, MetricSink, PushConfig,
    PushgatewayClient, RollbackController, RollbackReason, StageRecorder, StageStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Level};

/// Pushgateway job every series is grouped under.
const PUSH_JOB: &str = "relay_deploy";

#[derive(Parser)]
#[command(name = "relay-gate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay deployment gate and telemetry recorder", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the staging probe battery and report approve/block
    Validate {
        /// Staging host URL (e.g. https://staging.relay.dev)
        host: String,

        /// Write the full JSON report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Per-probe HTTP timeout in seconds
        #[arg(long, default_value = "15")]
        timeout_secs: u64,

        /// Allowed requests per hour per session
        #[arg(long, default_value = "20")]
        hourly_quota: u32,

        /// Allowed requests per rate-limit window
        #[arg(long, default_value = "30")]
        burst_limit: u32,
    },

    /// Record one deployment stage sample
    RecordStage {
        /// Stage name (build, migrate, deploy, smoke-test)
        #[arg(long)]
        stage: String,

        /// Service the stage ran for
        #[arg(long)]
        service: String,

        /// Stage outcome: success or failure
        #[arg(long)]
        status: String,

        /// Stage duration in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Error classification (failures only)
        #[arg(long)]
        error_type: Option<String>,
    },

    /// Check an endpoint and record its latency
    HealthCheck {
        /// Full URL to check
        url: String,

        /// Endpoint label on the recorded sample (default: URL path)
        #[arg(long)]
        endpoint: Option<String>,

        /// Request timeout in seconds
        #[arg(long, default_value = "15")]
        timeout_secs: u64,
    },

    /// Run a platform rollback command and record the outcome
    Rollback {
        /// Why the rollback fired: gate_failed, health_check_failed or manual
        #[arg(long)]
        reason: String,

        /// Rollback command to execute (first element is the executable)
        #[arg(long, required = true, num_args = 1.., allow_hyphen_values = true)]
        exec: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    relay_gate_core::init_tracing(cli.json, level);

    // The single boundary where ambient environment becomes explicit state.
    let ctx = DeploymentContext::from_env();
    let sink: Arc<dyn MetricSink> = Arc::new(PushgatewayClient::new(PushConfig::from_env()));

    match cli.command {
        Commands::Validate {
            host,
            output,
            timeout_secs,
            hourly_quota,
            burst_limit,
        } => {
            cmd_validate(
                ctx,
                sink,
                &host,
                output.as_deref(),
                timeout_secs,
                hourly_quota,
                burst_limit,
            )
            .await
        }
        Commands::RecordStage {
            stage,
            service,
            status,
            duration,
            error_type,
        } => cmd_record_stage(ctx, sink, &stage, &service, &status, duration, error_type.as_deref()).await,
        Commands::HealthCheck {
            url,
            endpoint,
            timeout_secs,
        } => cmd_health_check(ctx, sink, &url, endpoint.as_deref(), timeout_secs).await,
        Commands::Rollback { reason, exec } => cmd_rollback(ctx, sink, &reason, &exec).await,
    }
}

async fn cmd_validate(
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    host: &str,
    output: Option<&std::path::Path>,
    timeout_secs: u64,
    hourly_quota: u32,
    burst_limit: u32,
) -> Result<()> {
    let config = GateConfig {
        hourly_quota,
        burst_limit,
        probe_timeout: std::time::Duration::from_secs(timeout_secs),
        ..GateConfig::default()
    };
    let runner = GateRunner::new(host, config).context("Failed to build gate runner")?;

    // Ctrl-C abandons the run between probes; a partial run reports blocked.
    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, abandoning gate run");
            signal_flag.cancel();
        }
    });

    let started = Instant::now();
    let report = runner.run(&cancel).await;
    print!("{}", report.render());

    let status = if report.summary.approved() {
        StageStatus::Success
    } else {
        StageStatus::Failure
    };
    let mut recorder = StageRecorder::new(ctx, sink, PUSH_JOB)?;
    recorder
        .record_stage(
            "staging-validation",
            "gate",
            status,
            Some(started.elapsed().as_secs_f64()),
            (status == StageStatus::Failure).then_some("gate_blocked"),
        )
        .await?;

    if let Some(path) = output {
        let json = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "gate report written");
    }

    if !report.summary.approved() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_record_stage(
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    stage: &str,
    service: &str,
    status: &str,
    duration: Option<f64>,
    error_type: Option<&str>,
) -> Result<()> {
    let status: StageStatus = status.parse()?;
    let mut recorder = StageRecorder::new(ctx, sink, PUSH_JOB)?;
    recorder
        .record_stage(stage, service, status, duration, error_type)
        .await?;
    Ok(())
}

async fn cmd_health_check(
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    url: &str,
    endpoint: Option<&str>,
    timeout_secs: u64,
) -> Result<()> {
    let endpoint = endpoint
        .map(str::to_string)
        .or_else(|| reqwest::Url::parse(url).ok().map(|u| u.path().to_string()))
        .unwrap_or_else(|| url.to_string());

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let started = Instant::now();
    let healthy = match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            warn!(url, error = %e, "health check request failed");
            false
        }
    };
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let status = if healthy { StageStatus::Success } else { StageStatus::Failure };
    let mut recorder = StageRecorder::new(ctx, sink, PUSH_JOB)?;
    recorder.record_health_check(&endpoint, status, latency_ms).await?;

    println!(
        "{}  {}  {:.0}ms",
        if healthy { "PASS" } else { "FAIL" },
        endpoint,
        latency_ms
    );
    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_rollback(
    ctx: DeploymentContext,
    sink: Arc<dyn MetricSink>,
    reason: &str,
    exec: &[String],
) -> Result<()> {
    let reason: RollbackReason = reason.parse()?;
    anyhow::ensure!(!exec.is_empty(), "rollback command must not be empty");

    let controller = RollbackController::new(ctx, sink, PUSH_JOB);
    let command = exec.to_vec();
    let outcome = controller
        .rollback(reason, || run_rollback_command(command))
        .await;

    println!(
        "rollback {} ({}) in {:.1}s",
        outcome.status.as_str(),
        outcome.reason.as_str(),
        outcome.duration_seconds
    );
    if !outcome.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// The injected rollback action: run the platform command and fail on a
/// non-zero exit.
async fn run_rollback_command(command: Vec<String>) -> std::result::Result<(), String> {
    let exe = &command[0];
    let args = &command[1..];

    let output = tokio::process::Command::new(exe)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to spawn {exe}: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{exe} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ))
    }
}
