//! SSE (Server-Sent Events) streaming for chat completions.
//!
//! Converts the upstream chunk stream into `data: {"content": ...}` frames,
//! terminated by `data: [DONE]`. Frames are produced as chunks arrive;
//! dropping the returned stream drops the upstream connection with it.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::ApiError;
use crate::upstream::ChunkStream;

/// Terminal frame payload.
pub const DONE_FRAME: &str = "[DONE]";

/// Incremental content of one upstream chunk.
#[derive(Debug, Serialize)]
pub struct ContentFrame<'a> {
    pub content: &'a str,
}

/// Sent in place of `[DONE]` when the upstream fails mid-stream.
#[derive(Debug, Serialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Convert upstream chunks into an SSE event stream.
///
/// Chunks without choices produce no frame. An upstream error ends the
/// stream with a single error frame and no `[DONE]`, so clients can tell a
/// truncated answer from a complete one.
pub fn chunks_to_sse_stream(
    chunks: ChunkStream,
    request_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        loop {
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    let Some(choice) = chunk.choices.first() else {
                        continue;
                    };
                    let content = choice.delta.content.as_deref().unwrap_or_default();
                    let frame = ContentFrame { content };
                    return Some((json_event(&frame), Some(chunks)));
                }
                Some(Err(e)) => {
                    let err = ApiError::from(e);
                    error!(%request_id, "Upstream stream failed: {err}");
                    let frame = ErrorFrame {
                        error: err.to_string(),
                    };
                    return Some((json_event(&frame), None));
                }
                None => {
                    debug!(%request_id, "Upstream stream complete");
                    return Some((Ok(Event::default().data(DONE_FRAME)), None));
                }
            }
        }
    })
}

fn json_event<T: Serialize>(frame: &T) -> Result<Event, Infallible> {
    let data = serde_json::to_string(frame).unwrap_or_default();
    Ok(Event::default().data(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::response::sse::Sse;
    use axum::response::IntoResponse;

    use crate::error::UpstreamError;
    use crate::upstream::types::{ChunkChoice, CompletionChunk, Delta};

    fn chunk(content: Option<&str>) -> CompletionChunk {
        CompletionChunk {
            id: "c1".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: content.map(String::from),
                },
                finish_reason: None,
            }],
        }
    }

    async fn render(items: Vec<Result<CompletionChunk, UpstreamError>>) -> String {
        let chunks: ChunkStream = Box::pin(stream::iter(items));
        let response = Sse::new(chunks_to_sse_stream(chunks, Uuid::new_v4())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_frames_and_done_terminator() {
        let body = render(vec![
            Ok(CompletionChunk::default()),
            Ok(chunk(Some("Hel"))),
            Ok(chunk(Some("lo"))),
            Ok(chunk(None)),
        ])
        .await;

        assert_eq!(
            body,
            "data: {\"content\":\"Hel\"}\n\n\
             data: {\"content\":\"lo\"}\n\n\
             data: {\"content\":\"\"}\n\n\
             data: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_empty_upstream_still_terminates() {
        assert_eq!(render(vec![]).await, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_mid_stream_error_ends_without_done() {
        let body = render(vec![
            Ok(chunk(Some("partial"))),
            Err(UpstreamError::Stream("connection reset".to_string())),
            Ok(chunk(Some("never sent"))),
        ])
        .await;

        assert_eq!(
            body,
            "data: {\"content\":\"partial\"}\n\n\
             data: {\"error\":\"Internal server error: stream error: connection reset\"}\n\n"
        );
    }

    /// Flips its flag when the upstream stream holding it is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_client_disconnect_releases_upstream() {
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));

        let counter = polls.clone();
        let upstream = stream::unfold(DropFlag(dropped.clone()), move |flag| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some((Ok::<_, UpstreamError>(chunk(Some("tick"))), flag))
            }
        });
        let chunks: ChunkStream = Box::pin(upstream);

        let response = Sse::new(chunks_to_sse_stream(chunks, Uuid::new_v4())).into_response();
        let mut body = response.into_body().into_data_stream();

        let first = body.next().await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8_lossy(&first),
            "data: {\"content\":\"tick\"}\n\n"
        );
        let polled = polls.load(Ordering::SeqCst);
        assert!(polled >= 1);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(body);
        tokio::task::yield_now().await;

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(polls.load(Ordering::SeqCst), polled);
    }
}
