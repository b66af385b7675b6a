//! Recording push sender.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use wechat_bridge_core::error::PushError;
use wechat_bridge_core::push::PushSender;

/// Push sender that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingPushSender {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
    notify: Notify,
}

impl RecordingPushSender {
    /// Sender whose sends succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose sends fail with a platform error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Successful sends as `(open_id, content)`.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send attempts, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` sends were attempted. Returns `false` on timeout.
    pub async fn wait_for_sends(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.attempts() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send_text(&self, open_id: &str, content: &str) -> Result<(), PushError> {
        let result = if self.fail {
            Err(PushError::Platform {
                code: 45015,
                message: "response out of time limit".into(),
            })
        } else {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((open_id.to_string(), content.to_string()));
            Ok(())
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn waits_for_sends() {
        let sender = Arc::new(RecordingPushSender::new());
        let waiter = {
            let sender = Arc::clone(&sender);
            tokio::spawn(async move { sender.wait_for_sends(1, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        sender.send_text("o_user", "hi").await.unwrap();

        assert!(waiter.await.unwrap());
        assert_eq!(sender.sent(), vec![("o_user".into(), "hi".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sender_records_attempt_only() {
        let sender = RecordingPushSender::failing();
        assert!(sender.send_text("o_user", "hi").await.is_err());
        assert_eq!(sender.attempts(), 1);
        assert!(sender.sent().is_empty());
        assert!(!sender.wait_for_sends(2, Duration::from_secs(1)).await);
    }
}
