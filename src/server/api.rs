//! Chat proxy HTTP API.
//!
//! - POST /chat   (function key, when configured)
//! - GET  /health (anonymous)

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::middleware;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{Config, SERVICE_NAME};
use crate::error::ApiError;
use crate::server::auth::require_function_key;
use crate::server::streaming::chunks_to_sse_stream;
use crate::upstream::{AzureOpenAiClient, ChatMessage, ChatParams, Completion};

/// Application state shared across handlers. Immutable after startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: AzureOpenAiClient,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let chat = Router::new()
        .route("/chat", post(chat_completion))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_function_key,
        ));

    Router::new()
        .merge(chat)
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                // 5xx responses are logged by ApiError.
                .layer(TraceLayer::new_for_http().on_failure(()))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat request. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Passed through to the upstream untouched.
    #[serde(default = "default_messages")]
    pub messages: Vec<Value>,
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
    #[serde(default = "default_one")]
    pub temperature: f64,
    #[serde(default = "default_one")]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default)]
    pub stream: bool,
}

fn default_messages() -> Vec<Value> {
    vec![ChatMessage::user("What is AI?").into()]
}
fn default_max_completion_tokens() -> u32 {
    800
}
fn default_one() -> f64 {
    1.0
}

impl ChatRequest {
    /// Parse a raw body.
    ///
    /// Anything that is not a JSON object is a missing body (400). A JSON
    /// object with badly typed fields is a malformed parameter (500).
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ApiError::MissingBody)?;
        if !value.is_object() {
            return Err(ApiError::MissingBody);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Upstream parameters for the given deployment.
    pub fn into_params(self, model: &str) -> ChatParams {
        ChatParams {
            model: model.to_string(),
            messages: self.messages,
            max_completion_tokens: self.max_completion_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            stream: self.stream,
        }
    }
}

/// Chat completion response (non-streaming).
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<Completion> for ChatResponse {
    fn from(completion: Completion) -> Self {
        let usage = completion
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Self {
            id: completion.id,
            object: completion.object,
            created: completion.created,
            model: completion.model,
            choices: completion
                .choices
                .into_iter()
                .map(|choice| ChatChoice {
                    index: choice.index,
                    message: ChoiceMessage {
                        role: choice.message.role,
                        content: choice.message.content,
                    },
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            usage,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completion(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);

    async move {
        match handle_chat(&state, &body, request_id).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn handle_chat(
    state: &AppState,
    body: &[u8],
    request_id: Uuid,
) -> Result<Response, ApiError> {
    let req = ChatRequest::from_body(body)?;

    info!(
        messages = req.messages.len(),
        max_completion_tokens = req.max_completion_tokens,
        stream = req.stream,
        "Chat completion request"
    );

    let stream = req.stream;
    let params = req.into_params(state.upstream.deployment());

    if stream {
        let chunks = state.upstream.stream(params).await?;
        let sse = Sse::new(chunks_to_sse_stream(chunks, request_id));
        Ok((
            [
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            sse,
        )
            .into_response())
    } else {
        let completion = state.upstream.complete(params).await?;
        let response = ChatResponse::from(completion);

        info!(
            choices = response.choices.len(),
            total_tokens = response.usage.total_tokens,
            "Chat completion finished"
        );
        Ok(Json(response).into_response())
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::types::{Choice, ResponseMessage};

    #[test]
    fn test_empty_object_applies_defaults() {
        let req = ChatRequest::from_body(b"{}").unwrap();
        assert_eq!(
            req.messages,
            vec![serde_json::json!({"role": "user", "content": "What is AI?"})]
        );
        assert_eq!(req.max_completion_tokens, 800);
        assert_eq!(req.temperature, 1.0);
        assert_eq!(req.top_p, 1.0);
        assert_eq!(req.frequency_penalty, 0.0);
        assert_eq!(req.presence_penalty, 0.0);
        assert!(!req.stream);
    }

    #[test]
    fn test_missing_or_non_object_body() {
        let bodies: [&[u8]; 6] = [b"", b"not json", b"null", b"[]", b"42", b"\"text\""];
        for body in bodies {
            assert!(
                matches!(ChatRequest::from_body(body), Err(ApiError::MissingBody)),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_badly_typed_field_is_internal() {
        let err = ChatRequest::from_body(br#"{"temperature":"hot"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_into_params_passes_values_through() {
        let req = ChatRequest::from_body(
            br#"{"messages":[{"role":"system","content":"Be brief."},{"role":"user","content":"Hi"}],
                "max_completion_tokens":50,"temperature":0.2,"top_p":0.9,
                "frequency_penalty":0.5,"presence_penalty":-0.5,"stream":true}"#,
        )
        .unwrap();
        let params = req.into_params("gpt-4.1-mini");

        assert_eq!(params.model, "gpt-4.1-mini");
        assert_eq!(params.messages.len(), 2);
        assert_eq!(params.max_completion_tokens, 50);
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.frequency_penalty, 0.5);
        assert_eq!(params.presence_penalty, -0.5);
        assert!(params.stream);
    }

    #[test]
    fn test_messages_are_not_reshaped() {
        let messages = serde_json::json!([
            {"role": "user", "content": [{"type": "text", "text": "hi"}], "name": "ana"},
            {"role": "assistant", "content": null, "tool_calls": []},
            {"role": "tool", "tool_call_id": "call_1", "content": "42"}
        ]);
        let body = serde_json::json!({ "messages": messages }).to_string();

        let params = ChatRequest::from_body(body.as_bytes())
            .unwrap()
            .into_params("gpt-4.1-mini");
        assert_eq!(Value::Array(params.messages), messages);
    }

    #[test]
    fn test_response_usage_defaults_to_zero() {
        let completion = Completion {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created: 1_700_000_000,
            model: "gpt-4.1-mini".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: Some("AI is...".to_string()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        };

        let value = serde_json::to_value(ChatResponse::from(completion)).unwrap();
        assert_eq!(value["choices"][0]["message"]["content"], "AI is...");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            value["usage"],
            serde_json::json!({"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0})
        );
    }
}
