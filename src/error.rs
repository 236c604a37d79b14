use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{gemini::GeminiError, models::View, store::StoreError};

/// Failure taxonomy shared by every pipeline endpoint.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("design has already been submitted for CAD review")]
    AlreadySubmitted,
    #[error("rate limit exceeded, please try again later")]
    RateLimited,
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("AI response did not match the design schema: {reason}")]
    SchemaViolation { reason: String, raw: String },
    #[error("no image was returned for the {view} view")]
    EmptyResult { view: View },
    #[error("AI call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("AI gateway error: {0}")]
    Upstream(String),
    #[error("failed to record the design submission: {0}")]
    DownstreamWriteFailure(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn schema(reason: impl Into<String>, raw: &str) -> Self {
        PipelineError::SchemaViolation {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// Rate limit, quota or timeout: the gateway refused or stalled, as
    /// opposed to answering without an image.
    pub fn is_gateway_signal(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited | PipelineError::ServiceUnavailable(_) | PipelineError::Timeout(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(_) | PipelineError::AlreadySubmitted => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::ServiceUnavailable(_) => StatusCode::PAYMENT_REQUIRED,
            PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::SchemaViolation { .. }
            | PipelineError::EmptyResult { .. }
            | PipelineError::Upstream(_)
            | PipelineError::DownstreamWriteFailure(_)
            | PipelineError::Storage(_)
            | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = match &self {
            PipelineError::SchemaViolation { raw, .. } => {
                json!({ "error": self.to_string(), "raw_response": raw })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<GeminiError> for PipelineError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::RateLimited => PipelineError::RateLimited,
            GeminiError::QuotaExhausted(body) => PipelineError::ServiceUnavailable(body),
            other => PipelineError::Upstream(other.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<JsonRejection> for PipelineError {
    fn from(rejection: JsonRejection) -> Self {
        PipelineError::InvalidInput(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{error}` body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(PipelineError))]
pub struct ApiJson<T>(pub T);
