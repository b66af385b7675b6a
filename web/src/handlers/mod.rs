//! HTTP request handlers.

pub mod health;
pub mod wechat;

pub use health::{health_check, metrics, readiness_check};
pub use wechat::{receive_message, verify_url};
