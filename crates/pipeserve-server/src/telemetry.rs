//! Logging and metrics setup

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Initialize tracing/logging
pub fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("pipeserve=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pipeserve=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Install the Prometheus recorder and return handle for rendering
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "pipeserve_requests_total",
        "Total number of inference requests by outcome"
    );
    metrics::describe_counter!(
        "pipeserve_inference_errors_total",
        "Total number of failed inference calls by error type"
    );
    metrics::describe_histogram!(
        "pipeserve_inference_latency_us",
        metrics::Unit::Microseconds,
        "Pipeline invocation and normalization latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
