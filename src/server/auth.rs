//! Function-level key check.
//!
//! Mirrors the serverless platform convention: the caller presents the key
//! in the `x-functions-key` header or the `code` query parameter. With no
//! key configured every request is admitted.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::server::api::AppState;

pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";
pub const FUNCTION_KEY_QUERY: &str = "code";

/// Middleware guarding function-level routes.
pub async fn require_function_key(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.server.function_key.as_deref() {
        let header_key = headers
            .get(FUNCTION_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        let query_key = query.get(FUNCTION_KEY_QUERY).map(String::as_str);

        if header_key != Some(expected) && query_key != Some(expected) {
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}
