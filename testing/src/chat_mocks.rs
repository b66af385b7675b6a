//! Scripted chat backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use wechat_bridge_core::chat::{ChatBackend, ChatChunk, ChatRequest, ChatResponse, ResponseMode};
use wechat_bridge_core::error::ChatError;

/// Chat backend answering from a script.
///
/// Each call takes the next scripted answer; once the script runs out the
/// last answer repeats. Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedChatBackend {
    script: Mutex<VecDeque<Result<Vec<ChatChunk>, ChatError>>>,
    last: Mutex<Option<Result<Vec<ChatChunk>, ChatError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedChatBackend {
    /// Backend that always answers `text` in conversation `conversation_id`.
    #[must_use]
    pub fn answering(text: &str, conversation_id: &str) -> Arc<Self> {
        Self::default().then_answer(text, conversation_id).build()
    }

    /// Backend that always fails with `error`.
    #[must_use]
    pub fn failing(error: ChatError) -> Arc<Self> {
        Self::default().then_fail(error).build()
    }

    /// Queue an answer.
    #[must_use]
    pub fn then_answer(self, text: &str, conversation_id: &str) -> Self {
        self.then_chunks(vec![
            ChatChunk {
                event: Some("message".into()),
                answer: Some(text.into()),
                conversation_id: Some(conversation_id.into()),
            },
            ChatChunk {
                event: Some("message_end".into()),
                answer: None,
                conversation_id: Some(conversation_id.into()),
            },
        ])
    }

    /// Queue raw chunks.
    #[must_use]
    pub fn then_chunks(self, chunks: Vec<ChatChunk>) -> Self {
        self.push(Ok(chunks));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn then_fail(self, error: ChatError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Share the backend.
    #[must_use]
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn push(&self, answer: Result<Vec<ChatChunk>, ChatError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
    }

    fn next_answer(&self) -> Result<Vec<ChatChunk>, ChatError> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(answer) => {
                *last = Some(answer.clone());
                answer
            }
            None => last.clone().unwrap_or_else(|| Ok(Vec::new())),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let mode = request.response_mode;
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let chunks = self.next_answer()?;
        Ok(match mode {
            ResponseMode::Blocking => {
                let text: String = chunks.iter().filter_map(|c| c.answer.as_deref()).collect();
                ChatResponse::Single(ChatChunk {
                    event: Some("message".into()),
                    answer: Some(text),
                    conversation_id: chunks.iter().find_map(|c| c.conversation_id.clone()),
                })
            }
            ResponseMode::Streaming => {
                ChatResponse::Stream(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
            }
        })
    }
}
