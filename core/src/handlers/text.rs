use async_trait::async_trait;

use super::CONFIG_ERROR_REPLY;
use super::conversation::converse;
use crate::chat::ResponseMode;
use crate::error::HandlerError;
use crate::handler::{MessageHandler, Session};
use crate::message::WechatMessage;
use crate::settings::EndpointSettings;

/// Reply when the backend streamed no text.
pub const EMPTY_ANSWER_REPLY: &str = "AI没有给出回复";

/// Streams the backend's answer to a text message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

#[async_trait]
impl MessageHandler for TextHandler {
    async fn handle(
        &self,
        message: &WechatMessage,
        session: &Session,
        settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        let Some(app_id) = settings.chat_app() else {
            tracing::error!("No chat application configured");
            return Ok(CONFIG_ERROR_REPLY.to_string());
        };
        let query = message.content().unwrap_or_default();
        tracing::info!(
            user = %message.from_user,
            preview = %query.chars().take(50).collect::<String>(),
            "Handling text message"
        );

        let answer = converse(
            session,
            app_id,
            &message.from_user,
            query,
            ResponseMode::Streaming,
        )
        .await?;

        if answer.is_empty() {
            Ok(EMPTY_ANSWER_REPLY.to_string())
        } else {
            Ok(answer)
        }
    }
}
