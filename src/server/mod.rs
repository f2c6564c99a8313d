//! HTTP server for the chat proxy.
//!
//! - [`api`]: Routes, handlers, and request/response types
//! - [`auth`]: Function-key guard for `/chat`
//! - [`streaming`]: SSE framing of upstream completion chunks

pub mod api;
pub mod auth;
pub mod streaming;
