use async_trait::async_trait;

use super::conversation::converse;
use super::{CONFIG_ERROR_REPLY, PENDING_REPLY};
use crate::chat::ResponseMode;
use crate::error::HandlerError;
use crate::handler::{MessageHandler, Session};
use crate::message::{MessageBody, WechatMessage};
use crate::settings::EndpointSettings;

/// Passes a shared link's title, description and URL to the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkHandler;

#[async_trait]
impl MessageHandler for LinkHandler {
    async fn handle(
        &self,
        message: &WechatMessage,
        session: &Session,
        settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        let MessageBody::Link {
            title,
            description,
            url,
        } = &message.body
        else {
            return Err(HandlerError::Other(format!(
                "link handler got a {} message",
                message.msg_type()
            )));
        };
        tracing::info!(url = %url, "Handling link message");

        let Some(app_id) = settings.chat_app() else {
            tracing::error!("No chat application configured");
            return Ok(CONFIG_ERROR_REPLY.to_string());
        };

        let answer = converse(
            session,
            app_id,
            &message.from_user,
            format!("[链接] {title}\n{description}\nURL: {url}"),
            ResponseMode::Blocking,
        )
        .await?;

        Ok(if answer.is_empty() {
            PENDING_REPLY.to_string()
        } else {
            answer
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{EchoBackend, message, session};

    #[tokio::test]
    async fn empty_answer_is_pending() {
        let backend = EchoBackend::new(vec![]);
        let (session, _) = session(backend.clone());
        let link = message(MessageBody::Link {
            title: "Rust".into(),
            description: "A language".into(),
            url: "https://rust-lang.org".into(),
        });
        let settings = EndpointSettings {
            chat_app_id: Some("app".into()),
            ..EndpointSettings::default()
        };

        let reply = LinkHandler.handle(&link, &session, &settings).await.unwrap();
        assert_eq!(reply, PENDING_REPLY);
        assert_eq!(
            backend.requests()[0].query,
            "[链接] Rust\nA language\nURL: https://rust-lang.org"
        );
    }
}
