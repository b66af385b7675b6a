//! The `/wechat` webhook.
//!
//! # Endpoints
//!
//! ```text
//! GET  /wechat   URL verification challenge
//! POST /wechat   inbound message
//! ```
//!
//! POST answers follow the platform's retry contract: an empty 500 asks for
//! redelivery, an empty 200 ends the sequence, and a 200 with a body is the
//! passive reply.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use wechat_bridge_core::crypto::{CallbackQuery, MessageCrypto, verify_url_signature};
use wechat_bridge_core::formatter::{cdata, format_reply};
use wechat_bridge_core::parser::parse_xml;
use wechat_bridge_core::WechatMessage;
use wechat_bridge_runtime::Delivery;

use crate::error::EndpointError;
use crate::state::AppState;

/// Text command that forgets the sender's conversation.
pub const CLEAR_HISTORY_COMMAND: &str = "清除历史聊天记录";
/// Reply after the conversation was forgotten.
pub const CLEAR_HISTORY_DONE: &str = "已清除历史聊天记录";
/// Reply when forgetting the conversation failed.
pub const CLEAR_HISTORY_FAILED: &str = "清除历史记录失败，请稍后再试";

const XML_CONTENT_TYPE: &str = "application/xml";

/// URL verification.
///
/// Plaintext mode checks `signature` against the token and echoes
/// `echostr`. When the request carries `msg_signature` on an encrypted
/// endpoint, `echostr` is an envelope and its decrypted content is echoed.
///
/// # Errors
///
/// - 500 `微信Token未配置` without a token
/// - 500 `配置错误` when encrypted mode lacks an app id or has a bad key
/// - 403 `验证失败` when the signature or echo does not verify
pub async fn verify_url(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, EndpointError> {
    let settings = &state.settings;
    let token = settings.token().ok_or(EndpointError::TokenNotConfigured)?;

    if settings.is_encrypted_mode() && !query.msg_signature().is_empty() {
        let crypto = MessageCrypto::from_settings(settings).map_err(EndpointError::Configuration)?;
        let Some(codec) = crypto.codec() else {
            return Err(EndpointError::VerificationFailed);
        };
        let envelope = format!("<xml><Encrypt>{}</Encrypt></xml>", cdata(query.echostr()));
        return codec
            .decrypt_message(
                &envelope,
                query.msg_signature(),
                query.timestamp(),
                query.nonce(),
            )
            .inspect(|_| tracing::info!("Encrypted URL verification passed"))
            .map_err(|e| {
                tracing::warn!(error = %e, "Encrypted URL verification failed");
                EndpointError::VerificationFailed
            });
    }

    if verify_url_signature(token, query.timestamp(), query.nonce(), query.signature()) {
        tracing::info!("URL verification passed");
        Ok(query.echostr().to_string())
    } else {
        Err(EndpointError::VerificationFailed)
    }
}

/// Inbound message.
///
/// # Errors
///
/// - 500 `配置错误` when the crypto settings are unusable
/// - 400 `解密失败` when an encrypted body does not verify or decrypt
///
/// Every other failure ends in an empty 200 so the platform stops retrying.
pub async fn receive_message(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, EndpointError> {
    let crypto = MessageCrypto::from_settings(&state.settings).map_err(EndpointError::Configuration)?;
    let plaintext = crypto
        .decrypt_request(&query, &body)
        .map_err(EndpointError::Decryption)?;

    let message = match parse_xml(&plaintext) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable message, acknowledging");
            return Ok(empty(StatusCode::OK));
        }
    };

    tracing::info!(
        msg_id = %message.correlation_id(),
        msg_type = %message.msg_type(),
        from = %message.from_user,
        "Message received"
    );

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let reply = |text: &str| render(&state, &crypto, &query, content_type, &message, text);

    let handler = state.handlers.get(message.msg_type());

    if message.is_text_command(CLEAR_HISTORY_COMMAND) {
        let text = if handler.clear_cache(&state.session, &message.from_user) {
            CLEAR_HISTORY_DONE
        } else {
            CLEAR_HISTORY_FAILED
        };
        tracing::info!(from = %message.from_user, reply = %text, "Clear-history command");
        return Ok(reply(text));
    }

    let processing = state.coordinator.process(
        message.clone(),
        handler,
        state.session.clone(),
        Arc::clone(&state.settings),
    );
    let Ok(delivery) = AssertUnwindSafe(processing).catch_unwind().await else {
        tracing::error!(msg_id = %message.correlation_id(), "Coordinator panicked, acknowledging");
        return Ok(empty(StatusCode::OK));
    };

    Ok(match delivery {
        Delivery::Final(text) | Delivery::Transitional(text) => reply(&text),
        Delivery::RetryLater => empty(StatusCode::INTERNAL_SERVER_ERROR),
        Delivery::Acknowledge => empty(StatusCode::OK),
    })
}

fn render(
    state: &AppState,
    crypto: &MessageCrypto,
    query: &CallbackQuery,
    content_type: Option<&str>,
    message: &WechatMessage,
    text: &str,
) -> Response {
    let xml = format_reply(message, text, state.clock.now());
    let wire = crypto.encrypt_reply(xml, query, content_type);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        wire,
    )
        .into_response()
}

fn empty(status: StatusCode) -> Response {
    (status, Body::empty()).into_response()
}
