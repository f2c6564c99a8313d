//! Error types.
//!
//! [`UpstreamError`] covers everything that can go wrong talking to Azure
//! OpenAI. [`ApiError`] is what the HTTP handlers return; it renders itself
//! as a `{"error": ...}` JSON body and is the single place failures get
//! logged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Startup configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("AZURE_OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid upstream endpoint {0:?}")]
    InvalidEndpoint(String),
}

/// Errors from the upstream chat-completion API.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),

    #[error("Error code: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

/// Errors surfaced to HTTP callers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body absent, not JSON, or not a JSON object.
    #[error("Request body is required")]
    MissingBody,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingBody => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Internal(message) => error!("Error processing request: {message}"),
            other => warn!(status = status.as_u16(), "Rejected request: {other}"),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
