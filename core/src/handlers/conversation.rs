use crate::chat::{
    ChatRequest, MAX_TOTAL_STREAM_TIME, ResponseMode, STREAM_CHUNK_TIMEOUT, collect_answer,
    peek_conversation_id,
};
use crate::error::HandlerError;
use crate::handler::Session;
use crate::storage::conversation_key;

/// Ask the backend `query` on behalf of `user`, continuing their stored
/// conversation. A conversation id first seen on this call is saved.
pub(super) async fn converse(
    session: &Session,
    app_id: &str,
    user: &str,
    query: String,
    mode: ResponseMode,
) -> Result<String, HandlerError> {
    let key = conversation_key(user);
    let stored = stored_conversation_id(session, &key);

    tracing::info!(
        user = %user,
        app_id = %app_id,
        mode = ?mode,
        continuing = stored.is_some(),
        "Invoking chat backend"
    );

    let request = ChatRequest {
        app_id: app_id.to_string(),
        query,
        conversation_id: stored.clone(),
        user: user.to_string(),
        response_mode: mode,
    };
    let response = session.chat.invoke(request).await?;
    let (new_id, stream) = peek_conversation_id(response.into_stream()).await;

    if stored.is_none() {
        if let Some(id) = new_id {
            match session.storage.set(&key, id.clone().into_bytes()) {
                Ok(()) => tracing::info!(user = %user, conversation_id = %id, "Saved new conversation"),
                Err(e) => tracing::error!(user = %user, error = %e, "Failed to save conversation id"),
            }
        }
    }

    let collected = collect_answer(stream, STREAM_CHUNK_TIMEOUT, MAX_TOTAL_STREAM_TIME).await?;
    tracing::info!(
        chunks = collected.chunks,
        end = ?collected.end,
        len = collected.text.len(),
        "Chat answer collected"
    );
    Ok(collected.text)
}

fn stored_conversation_id(session: &Session, key: &str) -> Option<String> {
    match session.storage.get(key) {
        Ok(Some(bytes)) => String::from_utf8(bytes).ok().filter(|id| !id.is_empty()),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to read conversation id");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{EchoBackend, answer, session};
    use crate::storage::ConversationStore;

    #[tokio::test]
    async fn first_call_saves_conversation_id() {
        let backend = EchoBackend::new(vec![answer("hi", "conv-9")]);
        let (session, storage) = session(backend.clone());

        let text = converse(&session, "app", "o_user", "q".into(), ResponseMode::Streaming)
            .await
            .unwrap();

        assert_eq!(text, "hi");
        assert_eq!(
            storage.get("wechat_conv_o_user").unwrap().as_deref(),
            Some(&b"conv-9"[..])
        );
        assert!(backend.requests()[0].conversation_id.is_none());
    }

    #[tokio::test]
    async fn later_calls_reuse_stored_id() {
        let backend = EchoBackend::new(vec![answer("again", "conv-other")]);
        let (session, storage) = session(backend.clone());
        storage.set("wechat_conv_o_user", b"conv-1".to_vec()).unwrap();

        converse(&session, "app", "o_user", "q".into(), ResponseMode::Blocking)
            .await
            .unwrap();

        assert_eq!(backend.requests()[0].conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(
            storage.get("wechat_conv_o_user").unwrap().as_deref(),
            Some(&b"conv-1"[..])
        );
    }
}
