use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::rate_limit::RateLimitDecision;

/// Failure to extract fields from a `multipart/form-data` body.
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("body is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("part {part} is not valid UTF-8: {source}")]
    Utf8 {
        part: usize,
        source: std::str::Utf8Error,
    },

    #[error("part {part} has no name attribute")]
    MalformedPart { part: usize },

    #[error("content type carries no multipart boundary")]
    EmptyBoundary,
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Rate limit exceeded. Try again later.")]
    RateLimited(RateLimitDecision),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::RateLimited(decision) => {
                warn!(
                    current = decision.current_request_count,
                    window = decision.time_window,
                    "request rate limited"
                );
                let mut body = serde_json::to_value(decision).unwrap_or_else(|_| json!({}));
                body["message"] = json!(self.to_string());
                body
            }
            Self::Internal(err) => {
                error!("request failed: {err:#}");
                json!({ "error": "An unexpected error occurred." })
            }
            _ => {
                warn!("rejecting request: {self}");
                json!({ "error": self.to_string() })
            }
        };

        (status, Json(body)).into_response()
    }
}
