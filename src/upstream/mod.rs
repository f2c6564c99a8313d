//! Upstream chat-completion API.
//!
//! - [`client`]: Azure OpenAI HTTP client (JSON and streaming calls)
//! - [`types`]: Request, response, and stream-chunk wire types

pub mod client;
pub mod types;

pub use client::{AzureOpenAiClient, ChunkStream};
pub use types::{ChatMessage, ChatParams, Completion, CompletionChunk};
