//! Message handler seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chat::ChatBackend;
use crate::error::HandlerError;
use crate::message::WechatMessage;
use crate::settings::EndpointSettings;
use crate::storage::{ConversationStore, conversation_key};

/// Host capabilities a handler may use.
#[derive(Clone)]
pub struct Session {
    /// Conversational backend
    pub chat: Arc<dyn ChatBackend>,
    /// Conversation id storage
    pub storage: Arc<dyn ConversationStore>,
}

impl Session {
    /// Bundle a backend and a store.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatBackend>, storage: Arc<dyn ConversationStore>) -> Self {
        Self { chat, storage }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Turns one inbound message into reply text.
///
/// Handlers may be slow; the runtime decides how long anyone waits for them.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the reply text for `message`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the backend call or storage fails.
    async fn handle(
        &self,
        message: &WechatMessage,
        session: &Session,
        settings: &EndpointSettings,
    ) -> Result<String, HandlerError>;

    /// Forget the stored conversation for `user_id`. Returns whether it succeeded.
    fn clear_cache(&self, session: &Session, user_id: &str) -> bool {
        let key = conversation_key(user_id);
        match session.storage.delete(&key) {
            Ok(()) => {
                tracing::info!(user = %user_id, key = %key, "Cleared conversation");
                true
            }
            Err(e) => {
                tracing::error!(user = %user_id, error = %e, "Failed to clear conversation");
                false
            }
        }
    }
}
