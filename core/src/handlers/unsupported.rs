use async_trait::async_trait;

use crate::error::HandlerError;
use crate::handler::{MessageHandler, Session};
use crate::message::WechatMessage;
use crate::settings::EndpointSettings;

/// Reply for message types without a handler.
pub const UNSUPPORTED_REPLY: &str = "目前只支持文本消息";

/// Fallback for message types without a dedicated handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedHandler;

#[async_trait]
impl MessageHandler for UnsupportedHandler {
    async fn handle(
        &self,
        message: &WechatMessage,
        _session: &Session,
        _settings: &EndpointSettings,
    ) -> Result<String, HandlerError> {
        tracing::warn!(msg_type = %message.msg_type(), "Unsupported message type");
        Ok(UNSUPPORTED_REPLY.to_string())
    }
}
