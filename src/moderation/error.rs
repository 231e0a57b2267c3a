//! Pipeline failure taxonomy.

use thiserror::Error;

use crate::media::analysis::ModelError;
use crate::media::fetch::FetchError;

/// Every way a moderation request can fail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Could not fetch the image from the URL. Details: {0}")]
    FetchFailed(String),

    #[error("GenAI client is not initialized: {0}")]
    ModelUnavailable(String),

    #[error("Response was blocked by API. Feedback: {0}")]
    ModelBlocked(String),

    #[error("Model returned an empty response, likely due to a severe safety policy violation.")]
    ModelOutputEmpty,

    #[error("Failed to decode JSON from model response: {message}")]
    ModelOutputNotJson { message: String, raw: String },

    #[error("Model request failed: {0}")]
    ModelRequestFailed(String),
}

impl PipelineError {
    /// Stable snake_case label, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::FetchFailed(_) => "fetch_failed",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::ModelBlocked(_) => "model_blocked",
            PipelineError::ModelOutputEmpty => "model_output_empty",
            PipelineError::ModelOutputNotJson { .. } => "model_output_not_json",
            PipelineError::ModelRequestFailed(_) => "model_request_failed",
        }
    }

    /// Offending model text, for `ModelOutputNotJson`.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PipelineError::ModelOutputNotJson { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidReference(msg) => PipelineError::InvalidRequest(msg),
            other => PipelineError::FetchFailed(other.to_string()),
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable(msg) => PipelineError::ModelUnavailable(msg),
            ModelError::Blocked(feedback) => PipelineError::ModelBlocked(feedback),
            other => PipelineError::ModelRequestFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fetch_error() {
        assert_eq!(
            PipelineError::from(FetchError::Empty),
            PipelineError::FetchFailed("image data is empty".to_string())
        );
        assert!(matches!(
            PipelineError::from(FetchError::Status {
                status: 404,
                reason: "Not Found".to_string()
            }),
            PipelineError::FetchFailed(ref m) if m.contains("404")
        ));
        assert!(matches!(
            PipelineError::from(FetchError::InvalidReference("x".to_string())),
            PipelineError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_from_model_error() {
        assert_eq!(
            PipelineError::from(ModelError::Blocked("SAFETY".to_string())),
            PipelineError::ModelBlocked("SAFETY".to_string())
        );
        assert!(matches!(
            PipelineError::from(ModelError::Unavailable("no key".to_string())),
            PipelineError::ModelUnavailable(_)
        ));
        assert!(matches!(
            PipelineError::from(ModelError::ApiResponse {
                status: 500,
                body: "boom".to_string()
            }),
            PipelineError::ModelRequestFailed(_)
        ));
    }

    #[test]
    fn test_kind_and_raw_response() {
        let err = PipelineError::ModelOutputNotJson {
            message: "expected value".to_string(),
            raw: "nope".to_string(),
        };
        assert_eq!(err.kind(), "model_output_not_json");
        assert_eq!(err.raw_response(), Some("nope"));
        assert_eq!(PipelineError::ModelOutputEmpty.raw_response(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PipelineError::ModelBlocked("PROHIBITED_CONTENT".to_string()).to_string(),
            "Response was blocked by API. Feedback: PROHIBITED_CONTENT"
        );
        assert_eq!(
            PipelineError::FetchFailed("HTTP 404: Not Found".to_string()).to_string(),
            "Could not fetch the image from the URL. Details: HTTP 404: Not Found"
        );
    }
}
