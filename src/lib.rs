//! inkr-func-api: chat-completion proxy for Azure OpenAI.
//!
//! Accepts chat requests over HTTP, forwards them to a configured Azure
//! OpenAI deployment, and returns either a JSON completion or a stream of
//! Server-Sent Events carrying incremental content.

pub mod config;
pub mod error;
pub mod server;
pub mod upstream;
