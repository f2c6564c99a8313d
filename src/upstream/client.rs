//! HTTP client for the Azure OpenAI chat-completions endpoint.

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{future, Stream, TryStreamExt};
use reqwest::{Client, Response};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::upstream::types::{ChatParams, Completion, CompletionChunk, ErrorEnvelope};

/// Terminal `data:` payload of an upstream stream.
const DONE_SENTINEL: &str = "[DONE]";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Incremental completion chunks, in upstream order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, UpstreamError>> + Send>>;

/// Read-only client built once at startup and shared across requests.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: Client,
    url: String,
    config: UpstreamConfig,
}

impl AzureOpenAiClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| UpstreamError::Config(e.to_string()))?;

        Ok(Self {
            http,
            url: config.chat_completions_url(),
            config,
        })
    }

    /// Deployment name, sent as the request's `model`.
    pub fn deployment(&self) -> &str {
        &self.config.deployment
    }

    /// Run a non-streaming completion.
    pub async fn complete(&self, mut params: ChatParams) -> Result<Completion, UpstreamError> {
        params.stream = false;
        let response = self.post(&params).await?;
        let completion = response.json::<Completion>().await?;

        debug!(
            id = completion.id,
            choices = completion.choices.len(),
            "Upstream completion received"
        );
        Ok(completion)
    }

    /// Start a streaming completion.
    ///
    /// The returned stream owns the upstream connection; dropping it closes
    /// the connection. It ends at the upstream `[DONE]` sentinel or EOF,
    /// whichever comes first.
    pub async fn stream(&self, mut params: ChatParams) -> Result<ChunkStream, UpstreamError> {
        params.stream = true;
        let response = self.post(&params).await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .map_err(|e| UpstreamError::Stream(e.to_string()))
            .try_filter(|event| future::ready(!event.data.is_empty()))
            .try_take_while(|event| future::ready(Ok(event.data != DONE_SENTINEL)))
            .and_then(|event| {
                future::ready(
                    serde_json::from_str::<CompletionChunk>(&event.data)
                        .map_err(|e| UpstreamError::Decode(e.to_string())),
                )
            });

        Ok(Box::pin(chunks))
    }

    async fn post(&self, params: &ChatParams) -> Result<Response, UpstreamError> {
        debug!(
            url = self.url,
            messages = params.messages.len(),
            stream = params.stream,
            "Calling upstream"
        );

        let response = self
            .http
            .post(&self.url)
            .query(&[("api-version", self.config.api_version.as_str())])
            .header("api-key", &self.config.api_key)
            .json(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }
}

/// Extract `error.message` from an upstream error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error":{"code":"401","message":"Access denied due to invalid subscription key."}}"#;
        assert_eq!(
            error_message(body),
            "Access denied due to invalid subscription key."
        );
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message(" upstream exploded \n"), "upstream exploded");
    }

    #[test]
    fn test_deployment_comes_from_config() {
        let config = UpstreamConfig {
            api_key: "k".to_string(),
            deployment: "my-deploy".to_string(),
            ..UpstreamConfig::default()
        };
        let client = AzureOpenAiClient::new(config).unwrap();
        assert_eq!(client.deployment(), "my-deploy");
        assert!(client.url.ends_with("/openai/deployments/my-deploy/chat/completions"));
    }
}
