//! Streaming answer fan-out.
//!
//! One upstream token sequence feeds two independent consumers: the
//! caller's live [`AnswerStream`] and the accumulator that finalizes the
//! query log. Mid-stream failures never tear the transport down: they are
//! delivered as the in-band [`AnswerEvent::Error`] marker, and whatever was
//! produced before the failure is still persisted with its timings.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::log::{QueryLog, QueryLogStore};
use llm_service::TokenStream;

/// One event of the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// A generated text fragment, delivered in production order.
    Token(String),
    /// Terminal in-band failure marker; no further events follow.
    Error(String),
    /// Clean end of the answer.
    Done,
}

/// Live answer stream plus out-of-band response metadata.
pub struct AnswerStream {
    /// Identifier of the query log entry for this answer.
    pub query_id: String,
    /// Number of chunks retrieved for context.
    pub num_results: usize,
    inner: ReceiverStream<AnswerEvent>,
}

impl AnswerStream {
    pub(crate) fn new(
        query_id: String,
        num_results: usize,
        receiver: mpsc::Receiver<AnswerEvent>,
    ) -> Self {
        Self {
            query_id,
            num_results,
            inner: ReceiverStream::new(receiver),
        }
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Drives the upstream token stream, forwarding each fragment to the caller
/// while accumulating the full response, then finalizes the log entry.
///
/// A disconnected caller stops upstream token production (the token stream
/// is dropped), but the partial response and timings are still persisted.
pub(crate) fn spawn_fanout(
    mut tokens: TokenStream,
    mut log: QueryLog,
    store: Arc<dyn QueryLogStore>,
    generation_start: Instant,
    total_start: Instant,
) -> mpsc::Receiver<AnswerEvent> {
    let (tx, rx) = mpsc::channel::<AnswerEvent>(32);

    tokio::spawn(async move {
        let mut accumulated = String::new();
        let mut failed = false;

        while let Some(item) = tokens.next().await {
            match item {
                Ok(fragment) => {
                    accumulated.push_str(&fragment);
                    if tx.send(AnswerEvent::Token(fragment)).await.is_err() {
                        debug!("caller disconnected mid-stream, cancelling generation");
                        break;
                    }
                }
                Err(e) => {
                    failed = true;
                    let _ = tx.send(AnswerEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
        drop(tokens); // stop upstream production

        if !failed {
            let _ = tx.send(AnswerEvent::Done).await;
        }

        log.response = Some(accumulated);
        log.generation_ms = Some(generation_start.elapsed().as_millis() as u64);
        log.total_ms = Some(total_start.elapsed().as_millis() as u64);
        if let Err(e) = store.update(&log).await {
            warn!("query log finalize failed: {e}");
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryQueryLogStore;
    use llm_service::ProviderError;
    use std::time::Duration;

    fn token_stream(items: Vec<Result<String, ProviderError>>) -> TokenStream {
        Box::pin(futures_util::stream::iter(items))
    }

    fn fresh_log() -> QueryLog {
        QueryLog::new("q-1", "question", "ollama", "test-model")
    }

    async fn wait_for_response(store: &MemoryQueryLogStore) -> QueryLog {
        for _ in 0..50 {
            if let Some(log) = store.get("q-1").await {
                if log.response.is_some() {
                    return log;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log was never finalized");
    }

    #[tokio::test]
    async fn forwards_all_fragments_then_done() {
        let store = Arc::new(MemoryQueryLogStore::new());
        store.create(fresh_log()).await.unwrap();

        let rx = spawn_fanout(
            token_stream(vec![Ok("Hello".into()), Ok(", ".into()), Ok("world".into())]),
            fresh_log(),
            store.clone(),
            Instant::now(),
            Instant::now(),
        );

        let events: Vec<AnswerEvent> = ReceiverStream::new(rx).collect().await;
        assert_eq!(
            events,
            vec![
                AnswerEvent::Token("Hello".into()),
                AnswerEvent::Token(", ".into()),
                AnswerEvent::Token("world".into()),
                AnswerEvent::Done,
            ]
        );

        let log = wait_for_response(&store).await;
        assert_eq!(log.response.as_deref(), Some("Hello, world"));
        assert!(log.generation_ms.is_some());
        assert!(log.total_ms.is_some());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_the_partial_response() {
        let store = Arc::new(MemoryQueryLogStore::new());
        store.create(fresh_log()).await.unwrap();

        let rx = spawn_fanout(
            token_stream(vec![
                Ok("part one ".into()),
                Ok("part two".into()),
                Err(ProviderError::Unavailable("connection reset".into())),
            ]),
            fresh_log(),
            store.clone(),
            Instant::now(),
            Instant::now(),
        );

        let events: Vec<AnswerEvent> = ReceiverStream::new(rx).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], AnswerEvent::Error(_)));

        // The persisted response equals the fragments delivered before the
        // failure, and the generation latency is still recorded.
        let log = wait_for_response(&store).await;
        assert_eq!(log.response.as_deref(), Some("part one part two"));
        assert!(log.generation_ms.is_some());
    }

    #[tokio::test]
    async fn disconnected_caller_still_finalizes_the_log() {
        let store = Arc::new(MemoryQueryLogStore::new());
        store.create(fresh_log()).await.unwrap();

        let mut rx = spawn_fanout(
            token_stream(vec![Ok("one".into()), Ok("two".into()), Ok("three".into())]),
            fresh_log(),
            store.clone(),
            Instant::now(),
            Instant::now(),
        );

        // Consume a single fragment, then hang up.
        let first = rx.recv().await.unwrap();
        assert_eq!(first, AnswerEvent::Token("one".into()));
        drop(rx);

        let log = wait_for_response(&store).await;
        let response = log.response.unwrap();
        assert!(response.starts_with("one"));
    }
}
