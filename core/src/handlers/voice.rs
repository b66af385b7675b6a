use async_trait::async_trait;

use super::conversation::converse;
use super::{CONFIG_ERROR_REPLY, PENDING_REPLY};
use crate::chat::ResponseMode;
use crate::error::HandlerError;
use crate::handler::{MessageHandler, Session};
use crate::message::{MessageBody, WechatMessage};
use crate::settings::EndpointSettings;

/// Query used when the platform sent no recognition result.
pub const UNRECOGNIZED_VOICE_QUERY: &str =
    "您发送了一条语音消息，但我无法识别其中的内容。请尝试发送文字消息。";

/// Answers the platform's speech recognition of a voice message.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceHandler;

#[async_trait]
impl MessageHandler for VoiceHandler {
    async fn handle(
        &self,
        message: &WechatMessage,
        session: &Session,
        settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        let MessageBody::Voice {
            recognition,
            format,
            ..
        } = &message.body
        else {
            return Err(HandlerError::Other(format!(
                "voice handler got a {} message",
                message.msg_type()
            )));
        };
        tracing::info!(
            format = ?format,
            recognized = recognition.is_some(),
            "Handling voice message"
        );

        let Some(app_id) = settings.chat_app() else {
            tracing::error!("No chat application configured");
            return Ok(CONFIG_ERROR_REPLY.to_string());
        };

        let query = recognition
            .clone()
            .unwrap_or_else(|| UNRECOGNIZED_VOICE_QUERY.to_string());
        let answer = converse(
            session,
            app_id,
            &message.from_user,
            query,
            ResponseMode::Blocking,
        )
        .await?;

        Ok(match (recognition, answer.is_empty()) {
            (_, true) => PENDING_REPLY.to_string(),
            (Some(heard), false) => format!("您的语音内容：{heard}\n{answer}"),
            (None, false) => answer,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{EchoBackend, answer, message, session};

    fn settings() -> EndpointSettings {
        EndpointSettings {
            chat_app_id: Some("app".into()),
            ..EndpointSettings::default()
        }
    }

    #[tokio::test]
    async fn recognized_voice_is_echoed_before_answer() {
        let backend = EchoBackend::new(vec![answer("晴天", "c")]);
        let (session, _) = session(backend.clone());
        let voice = message(MessageBody::Voice {
            media_id: "m".into(),
            format: Some("amr".into()),
            recognition: Some("今天天气".into()),
        });

        let reply = VoiceHandler.handle(&voice, &session, &settings()).await.unwrap();
        assert_eq!(reply, "您的语音内容：今天天气\n晴天");
        assert_eq!(backend.requests()[0].query, "今天天气");
    }

    #[tokio::test]
    async fn unrecognized_voice_asks_for_text() {
        let backend = EchoBackend::new(vec![answer("请发文字", "c")]);
        let (session, _) = session(backend.clone());
        let voice = message(MessageBody::Voice {
            media_id: "m".into(),
            format: None,
            recognition: None,
        });

        let reply = VoiceHandler.handle(&voice, &session, &settings()).await.unwrap();
        assert_eq!(reply, "请发文字");
        assert_eq!(backend.requests()[0].query, UNRECOGNIZED_VOICE_QUERY);
    }
}
