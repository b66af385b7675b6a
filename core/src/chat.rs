//! Conversational backend seam.
//!
//! A backend call yields either one response object (`blocking` mode) or a
//! stream of incremental chunks (`streaming` mode). Each chunk may carry the
//! backend's conversation id and a terminal `message_end` event.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};

use crate::error::ChatError;

/// Event name that terminates a streamed answer.
pub const MESSAGE_END_EVENT: &str = "message_end";

/// Longest wait for a single streamed chunk.
pub const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest total time spent collecting one streamed answer.
pub const MAX_TOTAL_STREAM_TIME: Duration = Duration::from_secs(240);

/// How the backend should deliver the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Incremental chunks
    Streaming,
    /// Single response object
    Blocking,
}

/// One backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Backend application id
    pub app_id: String,
    /// User query
    pub query: String,
    /// Existing conversation to continue
    pub conversation_id: Option<String>,
    /// End-user identifier
    pub user: String,
    /// Delivery mode
    pub response_mode: ResponseMode,
}

/// A response object or stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Event name, e.g. `message` or `message_end`
    #[serde(default)]
    pub event: Option<String>,
    /// Answer text (a fragment when streaming)
    #[serde(default)]
    pub answer: Option<String>,
    /// Backend conversation id
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl ChatChunk {
    /// Whether this chunk ends the answer.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.event.as_deref() == Some(MESSAGE_END_EVENT)
    }
}

/// Boxed chunk stream.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ChatError>> + Send>>;

/// What a backend call returns.
pub enum ChatResponse {
    /// `blocking` mode
    Single(ChatChunk),
    /// `streaming` mode
    Stream(ChatStream),
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(chunk) => f.debug_tuple("Single").field(chunk).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl ChatResponse {
    /// View either shape as a stream.
    #[must_use]
    pub fn into_stream(self) -> ChatStream {
        match self {
            Self::Single(chunk) => Box::pin(stream::once(async move { Ok(chunk) })),
            Self::Stream(stream) => stream,
        }
    }
}

/// Conversational AI backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Invoke the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] if the request cannot be made or is rejected.
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ChatError>;
}

/// Look at the first chunk without consuming it.
///
/// Returns the first chunk's conversation id (if any) and a stream that
/// still yields every chunk, the first one included. A leading error is
/// left in the stream for the consumer to see.
pub async fn peek_conversation_id(stream: ChatStream) -> (Option<String>, ChatStream) {
    let mut peekable = stream.peekable();
    let conversation_id = match Pin::new(&mut peekable).peek().await {
        Some(Ok(chunk)) => chunk.conversation_id.clone(),
        _ => None,
    };
    (conversation_id, Box::pin(peekable))
}

/// Why answer collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// `message_end` event received
    MessageEnd,
    /// The stream ran out
    Exhausted,
    /// A single chunk took longer than the per-chunk limit
    ChunkTimeout,
    /// The total collection budget ran out
    TotalTimeout,
}

/// Concatenated answer text and how collection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedAnswer {
    /// Concatenated `answer` fragments
    pub text: String,
    /// Chunks seen
    pub chunks: usize,
    /// Termination reason
    pub end: StreamEnd,
}

/// Concatenate `answer` fragments until `message_end`, the end of the
/// stream, or a timeout.
///
/// # Errors
///
/// Returns the stream's error if it fails before yielding any text.
/// Failures after some text arrived end collection with what was gathered.
pub async fn collect_answer(
    mut stream: ChatStream,
    chunk_timeout: Duration,
    total_timeout: Duration,
) -> Result<CollectedAnswer, ChatError> {
    let deadline = Instant::now() + total_timeout;
    let mut text = String::new();
    let mut chunks = 0;

    let end = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break StreamEnd::TotalTimeout;
        }
        let wait = chunk_timeout.min(remaining);

        match timeout(wait, stream.next()).await {
            Err(_) if wait < chunk_timeout => break StreamEnd::TotalTimeout,
            Err(_) => {
                tracing::warn!(timeout_secs = chunk_timeout.as_secs(), "Stream chunk timed out");
                break StreamEnd::ChunkTimeout;
            }
            Ok(None) => break StreamEnd::Exhausted,
            Ok(Some(Err(e))) => {
                if text.is_empty() {
                    return Err(e);
                }
                tracing::warn!(error = %e, "Stream failed mid-answer, keeping partial text");
                break StreamEnd::Exhausted;
            }
            Ok(Some(Ok(chunk))) => {
                chunks += 1;
                if let Some(answer) = &chunk.answer {
                    text.push_str(answer);
                }
                if chunk.is_end() {
                    break StreamEnd::MessageEnd;
                }
            }
        }
    };

    Ok(CollectedAnswer { text, chunks, end })
}
