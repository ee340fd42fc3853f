//! HTTP routes and handlers

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pipeserve_core::{Error, InferenceRequest, InferenceResponse};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::inference::handle_inference;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit;

    Router::new()
        .route("/inference", post(inference))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/info", get(info))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "task": state.pipeline.task().as_str(),
        "pipeline": state.pipeline.name(),
    }))
}

/// Run the pipeline on one request
///
/// Replies `{"result": {...}}` on success. On failure the body is `null`
/// unless structured error responses are enabled.
async fn inference(
    State(state): State<AppState>,
    Json(request): Json<InferenceRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("inference", %request_id);

    match handle_inference(&state, request).instrument(span).await {
        Ok(response) => Json(Some(response)).into_response(),
        Err(e) if state.config.server.error_responses => AppError::from(e).into_response(),
        Err(_) => Json(None::<InferenceResponse>).into_response(),
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Structured inference failure
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.message,
                "type": self.kind,
            }
        });

        (self.status, Json(body)).into_response()
    }
}
