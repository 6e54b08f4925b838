// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stdout
/// so they never mix with the JSON envelopes scripts write to stderr.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str) -> Result<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(from_env.as_deref(), log_level)?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = log_level,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

/// Filter from `RUST_LOG` directives when they are set and valid, otherwise
/// from the configured level
fn build_filter(from_env: Option<&str>, log_level: &str) -> Result<EnvFilter> {
    if let Some(filter) = from_env
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
    {
        return Ok(filter);
    }

    EnvFilter::try_new(log_level)
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - job_submitted_total: Counter for jobs accepted by the broker
/// - job_success_total: Counter for jobs that completed
/// - job_failed_total: Counter for jobs that failed
/// - job_duration_seconds: Histogram for script run time
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "job_submitted_total",
        "Total number of jobs accepted by the broker"
    );
    describe_counter!("job_success_total", "Total number of completed jobs");
    describe_counter!("job_failed_total", "Total number of failed jobs");
    describe_histogram!("job_duration_seconds", "Duration of job scripts in seconds");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_job_submitted(task: &str) {
    counter!("job_submitted_total", "task" => task.to_string()).increment(1);
}

#[inline]
pub fn record_job_success(task: &str) {
    counter!("job_success_total", "task" => task.to_string()).increment(1);
}

#[inline]
pub fn record_job_failure(task: &str, reason: &str) {
    counter!(
        "job_failed_total",
        "task" => task.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_job_duration(task: &str, duration_seconds: f64) {
    histogram!("job_duration_seconds", "task" => task.to_string()).record(duration_seconds);
}
