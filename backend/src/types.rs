//! Wire types for the chat and customer-service APIs.

use serde::{Deserialize, Serialize};
use wechat_bridge_core::chat::{ChatChunk, ChatRequest, ResponseMode};

/// Body of `POST /chat-messages`.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessagesBody {
    /// App inputs; always empty here
    pub inputs: serde_json::Map<String, serde_json::Value>,
    /// User query
    pub query: String,
    /// `streaming` or `blocking`
    pub response_mode: ResponseMode,
    /// Conversation to continue; empty starts a new one
    pub conversation_id: String,
    /// End-user identifier
    pub user: String,
}

impl From<ChatRequest> for ChatMessagesBody {
    fn from(request: ChatRequest) -> Self {
        Self {
            inputs: serde_json::Map::new(),
            query: request.query,
            response_mode: request.response_mode,
            conversation_id: request.conversation_id.unwrap_or_default(),
            user: request.user,
        }
    }
}

/// One SSE `data:` payload (or the blocking response body).
#[derive(Clone, Debug, Deserialize)]
pub struct ChatEvent {
    /// `message`, `agent_message`, `message_end`, `ping`, `error`, ...
    #[serde(default)]
    pub event: Option<String>,
    /// Answer text or fragment
    #[serde(default)]
    pub answer: Option<String>,
    /// Conversation id
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Error status on `error` events
    #[serde(default)]
    pub status: Option<u16>,
    /// Error message on `error` events
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatEvent {
    /// Whether this is an in-stream error report.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some("error")
    }

    /// Whether this is a keep-alive.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.event.as_deref() == Some("ping")
    }
}

impl From<ChatEvent> for ChatChunk {
    fn from(event: ChatEvent) -> Self {
        Self {
            event: event.event,
            answer: event.answer,
            conversation_id: event.conversation_id,
        }
    }
}

/// Response of `GET /cgi-bin/token`.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token on success
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Error code on failure
    #[serde(default)]
    pub errcode: Option<i64>,
    /// Error message on failure
    #[serde(default)]
    pub errmsg: Option<String>,
}

/// Body of `POST /cgi-bin/message/custom/send`.
#[derive(Clone, Debug, Serialize)]
pub struct CustomTextMessage<'a> {
    /// Recipient open id
    pub touser: &'a str,
    /// Always `text`
    pub msgtype: &'static str,
    /// Text payload
    pub text: TextContent<'a>,
}

/// `{"content": ..}`
#[derive(Clone, Debug, Serialize)]
pub struct TextContent<'a> {
    /// Message text
    pub content: &'a str,
}

impl<'a> CustomTextMessage<'a> {
    /// Text message to `touser`.
    #[must_use]
    pub const fn new(touser: &'a str, content: &'a str) -> Self {
        Self {
            touser,
            msgtype: "text",
            text: TextContent { content },
        }
    }
}

/// `{"errcode": .., "errmsg": ..}`
#[derive(Clone, Debug, Deserialize)]
pub struct PlatformStatus {
    /// Zero on success
    #[serde(default)]
    pub errcode: i64,
    /// Human-readable status
    #[serde(default)]
    pub errmsg: String,
}
