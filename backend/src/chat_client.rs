//! Chat-messages API client implementation

use crate::types::{ChatEvent, ChatMessagesBody};
use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use reqwest::{Client, Response, StatusCode};
use wechat_bridge_core::chat::{
    ChatBackend, ChatChunk, ChatRequest, ChatResponse, ChatStream, ResponseMode,
};
use wechat_bridge_core::error::ChatError;

/// Chat-messages API client
///
/// The API key selects the backend application; `ChatRequest::app_id` is
/// only used for logging.
#[derive(Clone)]
pub struct ChatApiClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl std::fmt::Debug for ChatApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApiClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl ChatApiClient {
    /// Create a client for the API rooted at `api_url` (e.g. `https://api.dify.ai/v1`)
    #[must_use]
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, body: &ChatMessagesBody) -> Result<Response, ChatError> {
        let response = self
            .client
            .post(format!("{}/chat-messages", self.api_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(ChatError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(ChatError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ChatError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }

    /// Send a blocking request and return the whole answer
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn blocking(&self, body: &ChatMessagesBody) -> Result<ChatEvent, ChatError> {
        self.post(body)
            .await?
            .json::<ChatEvent>()
            .await
            .map_err(|e| ChatError::ResponseParseFailed(e.to_string()))
    }

    /// Send a streaming request
    ///
    /// Yields one item per SSE `data:` line. Keep-alive pings are skipped and
    /// in-stream `error` events surface as [`ChatError::ApiError`].
    ///
    /// # Errors
    ///
    /// Returns errors for network failures or API errors. Individual stream items
    /// may also contain errors if event parsing fails.
    pub async fn streaming(&self, body: &ChatMessagesBody) -> Result<ChatStream, ChatError> {
        let byte_stream = self.post(body).await?.bytes_stream();
        Ok(sse_events(byte_stream))
    }
}

/// Chunks parsed from an SSE byte stream.
///
/// Lines are cut on raw `\n` bytes and decoded whole, so a multi-byte
/// character split across network reads arrives intact.
fn sse_events<S, B, E>(byte_stream: S) -> ChatStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(stream! {
        let mut buffer: Vec<u8> = Vec::new();

        for await chunk in byte_stream {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(bytes.as_ref());

                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        if let Some(item) = parse_sse_line(&line) {
                            yield item;
                        }
                    }
                }
                Err(e) => {
                    yield Err(ChatError::StreamFailed(e.to_string()));
                    break;
                }
            }
        }
    })
}

/// One SSE line; `None` for non-data lines and keep-alives.
fn parse_sse_line(line: &[u8]) -> Option<Result<ChatChunk, ChatError>> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(e) => return Some(Err(ChatError::ResponseParseFailed(e.to_string()))),
    };
    let json_data = line.strip_prefix("data:")?;

    match serde_json::from_str::<ChatEvent>(json_data.trim()) {
        Ok(event) if event.is_ping() => None,
        Ok(event) if event.is_error() => Some(Err(ChatError::ApiError {
            status: event.status.unwrap_or(500),
            message: event.message.unwrap_or_default(),
        })),
        Ok(event) => Some(Ok(event.into())),
        Err(e) => Some(Err(ChatError::ResponseParseFailed(e.to_string()))),
    }
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        tracing::debug!(
            app_id = %request.app_id,
            mode = ?request.response_mode,
            continuing = request.conversation_id.is_some(),
            "Calling chat-messages API"
        );
        let mode = request.response_mode;
        let body = ChatMessagesBody::from(request);

        match mode {
            ResponseMode::Blocking => Ok(ChatResponse::Single(self.blocking(&body).await?.into())),
            ResponseMode::Streaming => Ok(ChatResponse::Stream(self.streaming(&body).await?)),
        }
    }
}
