//! Message, settings and session fixtures.

use std::sync::Arc;

use wechat_bridge_core::settings::DEFAULT_TEMP_RESPONSE;
use wechat_bridge_core::storage::InMemoryConversationStore;
use wechat_bridge_core::{EndpointSettings, MessageBody, Session, WechatMessage};

use crate::chat_mocks::ScriptedChatBackend;

/// Server token used by fixtures.
pub const TEST_TOKEN: &str = "test-token";
/// 43-character `EncodingAESKey` used by fixtures.
pub const TEST_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
/// Official account app id used by fixtures.
pub const TEST_APP_ID: &str = "wx_test_app";

/// Message from `o_user` to `gh_account` with `body`. An empty `msg_id`
/// means none.
#[must_use]
pub fn message_with(msg_id: &str, body: MessageBody) -> WechatMessage {
    WechatMessage {
        from_user: "o_user".into(),
        to_user: "gh_account".into(),
        create_time: 1_735_689_600,
        msg_id: (!msg_id.is_empty()).then(|| msg_id.to_string()),
        body,
    }
}

/// Text message.
#[must_use]
pub fn text_message(msg_id: &str, content: &str) -> WechatMessage {
    message_with(
        msg_id,
        MessageBody::Text {
            content: content.into(),
        },
    )
}

/// Event message; events never carry a message id.
#[must_use]
pub fn event_message(event: &str) -> WechatMessage {
    message_with(
        "",
        MessageBody::Event {
            event: event.into(),
            event_key: None,
        },
    )
}

/// Plaintext-mode settings with push credentials and a chat app.
#[must_use]
pub fn test_settings() -> EndpointSettings {
    EndpointSettings {
        wechat_token: Some(TEST_TOKEN.into()),
        encoding_aes_key: None,
        app_id: Some(TEST_APP_ID.into()),
        app_secret: Some("test-secret".into()),
        chat_app_id: Some("chat-app".into()),
        temp_response: DEFAULT_TEMP_RESPONSE.into(),
    }
}

/// [`test_settings`] with an `EncodingAESKey`.
#[must_use]
pub fn encrypted_settings() -> EndpointSettings {
    EndpointSettings {
        encoding_aes_key: Some(TEST_AES_KEY.into()),
        ..test_settings()
    }
}

/// Session over `backend` and a fresh in-memory store.
#[must_use]
pub fn session_with(backend: Arc<ScriptedChatBackend>) -> (Session, Arc<InMemoryConversationStore>) {
    let storage = Arc::new(InMemoryConversationStore::new());
    (Session::new(backend, storage.clone()), storage)
}

/// Session whose backend answers "ok".
#[must_use]
pub fn test_session() -> Session {
    session_with(ScriptedChatBackend::answering("ok", "conv-test")).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_means_none() {
        assert!(text_message("", "hi").msg_id.is_none());
        assert_eq!(text_message("7", "hi").msg_id.as_deref(), Some("7"));
        assert!(event_message("subscribe").msg_id.is_none());
    }

    #[test]
    fn encrypted_settings_enable_aes() {
        assert!(encrypted_settings().is_encrypted_mode());
        assert!(!test_settings().is_encrypted_mode());
    }
}
