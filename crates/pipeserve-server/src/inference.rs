//! Inference request handling
//!
//! Runs the pipeline on one request and normalizes its result into the
//! `{"result": {...}}` reply.

use crate::state::AppState;
use pipeserve_core::{InferenceRequest, InferenceResponse, Result};
use pipeserve_pipelines::Pipeline;
use std::time::Instant;
use tracing::{debug, error, info};

/// Invoke `pipeline` and normalize its output
pub async fn run_inference(
    pipeline: &dyn Pipeline,
    request: &InferenceRequest,
) -> Result<InferenceResponse> {
    info!(
        input = %request.input,
        args = %serde_json::to_string(&request.args).unwrap_or_default(),
        "Running inference"
    );

    let output = pipeline.run(&request.input, &request.args).await?;
    debug!(kind = output.kind(), "Pipeline returned");

    let result = output.into_mapping()?;
    info!(
        result = %serde_json::to_string(&result).unwrap_or_default(),
        "Inference complete"
    );

    Ok(InferenceResponse { result })
}

/// Handle one request against the shared pipeline
///
/// Failures are logged and counted here. The caller decides whether the
/// error reaches the client; by default it is suppressed.
pub async fn handle_inference(
    state: &AppState,
    request: InferenceRequest,
) -> Result<InferenceResponse> {
    let start = Instant::now();
    let outcome = run_inference(state.pipeline.as_ref(), &request).await;
    let elapsed_us = start.elapsed().as_micros() as f64;

    metrics::histogram!("pipeserve_inference_latency_us").record(elapsed_us);

    match &outcome {
        Ok(_) => {
            metrics::counter!("pipeserve_requests_total", "outcome" => "ok").increment(1);
        }
        Err(e) => {
            error!(kind = e.kind(), "Error during inference: {}", e);
            metrics::counter!("pipeserve_requests_total", "outcome" => "error").increment(1);
            metrics::counter!("pipeserve_inference_errors_total", "type" => e.kind())
                .increment(1);
        }
    }

    outcome
}
