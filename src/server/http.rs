//! HTTP adapter
//!
//! `POST /` with `{"image_url": "..."}` runs the pipeline and answers with the
//! verdict. Every [`PipelineError`] variant maps to one status code here and
//! nowhere else.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde::Serialize;
use serde_json::Value;

use crate::moderation::{ModerationPipeline, ModerationRequest, PipelineError};

/// Body field carrying the image reference.
pub const IMAGE_URL_FIELD: &str = "image_url";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pipeline: Arc<ModerationPipeline>,
}

impl AppState {
    pub fn new(pipeline: ModerationPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    model_ready: bool,
}

/// Build the router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(moderate_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Status code for each pipeline failure.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::FetchFailed(_) => StatusCode::BAD_REQUEST,
        PipelineError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::ModelBlocked(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::ModelOutputEmpty => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::ModelOutputNotJson { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::ModelRequestFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: message.into(),
        raw_response: None,
    };
    (status, Json(body)).into_response()
}

fn pipeline_error_response(err: &PipelineError) -> Response {
    let body = ErrorBody {
        error: err.to_string(),
        raw_response: err.raw_response(),
    };
    (status_for(err), Json(body)).into_response()
}

/// Extract the moderation request from a JSON body.
fn parse_request(body: &[u8]) -> Result<ModerationRequest, String> {
    let missing = || format!("Missing '{IMAGE_URL_FIELD}' in request body");

    let value: Value = serde_json::from_slice(body).map_err(|_| missing())?;
    let field = value
        .as_object()
        .and_then(|obj| obj.get(IMAGE_URL_FIELD))
        .ok_or_else(missing)?;
    let url = field
        .as_str()
        .ok_or_else(|| format!("'{IMAGE_URL_FIELD}' must be a string"))?;
    Ok(ModerationRequest::new(url))
}

async fn moderate_handler(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only POST method is accepted",
        );
    }

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(message) => {
            tracing::debug!(error = %message, "rejected request body");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    match state.pipeline.process(&request).await {
        Ok(verdict) => {
            if !verdict.score_in_range() {
                tracing::warn!(
                    score = verdict.is_likely_ai_score,
                    "AI-likelihood score outside [0, 1]"
                );
            }
            (StatusCode::OK, Json(verdict)).into_response()
        }
        Err(err) => pipeline_error_response(&err),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model_ready: state.pipeline.model_ready(),
    })
}
