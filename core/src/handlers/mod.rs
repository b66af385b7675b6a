//! Per message-type handlers and the registry that picks one.

mod conversation;
mod image;
mod link;
mod text;
mod unsupported;
mod voice;

use std::collections::HashMap;
use std::sync::Arc;

pub use image::ImageHandler;
pub use link::LinkHandler;
pub use text::{EMPTY_ANSWER_REPLY, TextHandler};
pub use unsupported::{UNSUPPORTED_REPLY, UnsupportedHandler};
pub use voice::VoiceHandler;

use crate::handler::MessageHandler;

/// Reply used when no chat application is configured.
pub const CONFIG_ERROR_REPLY: &str = "系统配置错误";

/// Reply used when a blocking call returned no answer.
pub const PENDING_REPLY: &str = "系统处理中，请稍后再试";

/// Maps `MsgType` to a handler, with a fallback for everything else.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    fallback: Arc<dyn MessageHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Registry with the built-in text, image, voice and link handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with("text", Arc::new(TextHandler))
            .with("image", Arc::new(ImageHandler))
            .with("voice", Arc::new(VoiceHandler))
            .with("link", Arc::new(LinkHandler))
    }

    /// Registry where every type falls back to [`UnsupportedHandler`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(UnsupportedHandler),
        }
    }

    /// Register (or replace) the handler for `msg_type`.
    #[must_use]
    pub fn with(mut self, msg_type: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(msg_type.into(), handler);
        self
    }

    /// Replace the fallback handler.
    #[must_use]
    pub fn with_fallback(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.fallback = handler;
        self
    }

    /// Handler for `msg_type`.
    #[must_use]
    pub fn get(&self, msg_type: &str) -> Arc<dyn MessageHandler> {
        self.handlers
            .get(msg_type)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .finish_non_exhaustive()
    }
}
