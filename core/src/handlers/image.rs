use async_trait::async_trait;

use super::conversation::converse;
use super::{CONFIG_ERROR_REPLY, PENDING_REPLY};
use crate::chat::ResponseMode;
use crate::error::HandlerError;
use crate::handler::{MessageHandler, Session};
use crate::message::{MessageBody, WechatMessage};
use crate::settings::EndpointSettings;

/// Describes an image to the backend by URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHandler;

#[async_trait]
impl MessageHandler for ImageHandler {
    async fn handle(
        &self,
        message: &WechatMessage,
        session: &Session,
        settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        let MessageBody::Image { pic_url, .. } = &message.body else {
            return Err(HandlerError::Other(format!(
                "image handler got a {} message",
                message.msg_type()
            )));
        };
        tracing::info!(pic_url = %pic_url, "Handling image message");

        let Some(app_id) = settings.chat_app() else {
            tracing::error!("No chat application configured");
            return Ok(CONFIG_ERROR_REPLY.to_string());
        };

        let answer = converse(
            session,
            app_id,
            &message.from_user,
            format!("[图片] URL: {pic_url}"),
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
    use crate::handlers::test_support::{EchoBackend, answer, message, session};

    #[tokio::test]
    async fn sends_picture_url_as_query() {
        let backend = EchoBackend::new(vec![answer("a cat", "c")]);
        let (session, _) = session(backend.clone());
        let image = message(MessageBody::Image {
            pic_url: "http://img/cat.jpg".into(),
            media_id: "m".into(),
        });
        let settings = EndpointSettings {
            chat_app_id: Some("app".into()),
            ..EndpointSettings::default()
        };

        let reply = ImageHandler.handle(&image, &session, &settings).await.unwrap();
        assert_eq!(reply, "a cat");

        let request = &backend.requests()[0];
        assert_eq!(request.query, "[图片] URL: http://img/cat.jpg");
        assert_eq!(request.response_mode, ResponseMode::Blocking);
    }
}
