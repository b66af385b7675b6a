//! # WeChat Bridge Backend Clients
//!
//! HTTP clients for the two services the bridge talks to:
//!
//! - [`ChatApiClient`]: a Dify-style `chat-messages` API, in blocking and
//!   Server-Sent Events streaming mode, implementing
//!   [`ChatBackend`](wechat_bridge_core::chat::ChatBackend)
//! - [`CustomMessageSender`]: the official-account customer-service message
//!   API, implementing [`PushSender`](wechat_bridge_core::push::PushSender),
//!   backed by a shared [`AccessTokenCache`]
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wechat_bridge_backend::{AccessTokenCache, CustomMessageSender};
//! use wechat_bridge_core::environment::SystemClock;
//! use wechat_bridge_core::push::PushSender;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = Arc::new(AccessTokenCache::new(Arc::new(SystemClock)));
//! let sender = CustomMessageSender::new("wx_app_id", "app_secret", tokens);
//! sender.send_text("o_user_open_id", "Your answer is ready").await?;
//! # Ok(())
//! # }
//! ```

pub mod chat_client;
pub mod custom_message;
pub mod types;

pub use chat_client::ChatApiClient;
pub use custom_message::{AccessTokenCache, CustomMessageSender, WECHAT_API_BASE};
