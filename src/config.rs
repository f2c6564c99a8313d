//! Runtime configuration for inkr-func-api.
//!
//! Everything is read once at startup from command-line flags, falling back
//! to environment variables, and frozen into an immutable [`Config`] that
//! handlers share through `Arc`.

use std::time::Duration;

use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "inkr-func-api";

pub const DEFAULT_ENDPOINT: &str = "https://inkr-openai.openai.azure.com/";
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4.1-mini";
pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Command-line arguments for the server.
#[derive(Parser, Debug, Clone)]
#[command(name = "inkr-func-api", about = "Chat-completion proxy for Azure OpenAI")]
pub struct Cli {
    /// HTTP listen address.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:7071")]
    pub listen: String,

    /// Function key required on /chat. Unset means open access.
    #[arg(long, env = "FUNCTION_KEY", hide_env_values = true)]
    pub function_key: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

/// Upstream connection flags, shared by the server and the smoke tool.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Azure OpenAI API key.
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Azure OpenAI resource endpoint.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Deployment (model configuration) to invoke.
    #[arg(long, env = "AZURE_OPENAI_DEPLOYMENT", default_value = DEFAULT_DEPLOYMENT)]
    pub deployment: String,

    /// `api-version` query parameter.
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Overall upstream request timeout in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl UpstreamArgs {
    /// Validate the flags into an [`UpstreamConfig`].
    pub fn into_config(self) -> Result<UpstreamConfig, ConfigError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ConfigError::InvalidEndpoint(self.endpoint));
        }

        Ok(UpstreamConfig {
            endpoint: self.endpoint,
            deployment: self.deployment,
            api_version: self.api_version,
            api_key,
            timeout_secs: self.timeout_secs,
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Upstream API settings.
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                listen: cli.listen,
                function_key: cli.function_key.filter(|key| !key.is_empty()),
            },
            upstream: cli.upstream.into_config()?,
        })
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:7071").
    pub listen: String,

    /// Shared secret for function-level routes.
    #[serde(skip_serializing)]
    pub function_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:7071".to_string(),
            function_key: None,
        }
    }
}

/// Azure OpenAI connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Resource endpoint, e.g. `https://<name>.openai.azure.com/`.
    pub endpoint: String,

    /// Deployment name; also sent as `model`.
    pub deployment: String,

    /// `api-version` query parameter.
    pub api_version: String,

    /// Secret sent in the `api-key` header.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Overall request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    /// Chat-completions URL for the configured deployment, without the
    /// `api-version` query.
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
