//! Out-of-band "customer service" message channel.

use async_trait::async_trait;

use crate::error::PushError;

/// Sends a text message to a user outside the request/response cycle.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver `content` to `open_id`. Single attempt, no retry.
    ///
    /// # Errors
    ///
    /// Returns [`PushError`] if the token cannot be obtained, the request
    /// fails, or the platform rejects the message.
    async fn send_text(&self, open_id: &str, content: &str) -> Result<(), PushError>;
}
