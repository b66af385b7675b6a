//! Scripted message handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use wechat_bridge_core::error::HandlerError;
use wechat_bridge_core::{EndpointSettings, MessageHandler, Session, WechatMessage};

#[derive(Debug, Clone)]
enum Behavior {
    Reply(String),
    Fail(String),
    Panic(String),
}

/// Handler with a fixed outcome and optional delay. Counts its calls.
#[derive(Debug)]
pub struct ScriptedHandler {
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies with `text`.
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Reply(text.into()))
    }

    /// Fails with `HandlerError::Other(message)`.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(message.into()))
    }

    /// Panics with `message`.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Panic(message.into()))
    }

    /// Sleep for `delay` before the outcome.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `handle` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    #[allow(clippy::panic)]
    async fn handle(
        &self,
        _message: &WechatMessage,
        _session: &Session,
        _settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Reply(text) => Ok(text.clone()),
            Behavior::Fail(message) => Err(HandlerError::Other(message.clone())),
            Behavior::Panic(message) => panic!("{message}"),
        }
    }
}
