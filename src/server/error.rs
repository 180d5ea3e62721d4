//! HTTP error responses with a structured JSON body

use crate::error::InpaintError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// `{"error": {...}}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Request-level errors with HTTP status mapping
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Undecodable upload: {0}")]
    Decode(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Inference(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            Self::Decode(detail) => ("DECODE_FAILED", detail),
            Self::BadRequest(detail) => ("BAD_REQUEST", detail),
            Self::Inference(detail) => {
                tracing::error!(detail, "inpainting failed");
                ("INFERENCE_FAILED", "Inpainting failed".to_string())
            },
            Self::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                ("INTERNAL", "An internal error occurred".to_string())
            },
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<InpaintError> for ApiError {
    fn from(err: InpaintError) -> Self {
        match err {
            InpaintError::Decode(msg) => Self::Decode(msg),
            InpaintError::Validation(msg) => Self::BadRequest(msg),
            InpaintError::Inference(msg) => Self::Inference(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}
