//! Out-of-band delivery of results the HTTP channel could not return.
//!
//! A notifier is started when the first request times out. It waits for the
//! handler, gives platform retries a short grace period to deliver the result
//! in-band, and otherwise claims delivery and pushes the result as a
//! customer-service message.

use std::sync::Arc;

use tokio::task::JoinHandle;
use wechat_bridge_core::push::PushSender;

use crate::config::NotifierConfig;
use crate::metrics::NotifierMetrics;
use crate::registry::{MessageEntry, StatusUpdate};

/// Reply recorded when the handler outlives the notifier.
pub const TIMEOUT_REPLY: &str = "处理超时，请重试";
/// Error recorded when the handler outlives the notifier.
pub const TIMEOUT_ERROR: &str = "处理超时(>5分钟)";
/// Pushed when the handler completed without any text.
pub const MISSING_RESULT_REPLY: &str = "抱歉，无法获取处理结果";

/// Why a notifier exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierOutcome {
    /// The handler did not finish in time; the entry was marked timed out
    TimedOut,
    /// A retry delivered the result in-band
    Skipped,
    /// Another channel claimed delivery first
    ClaimLost,
    /// No push credentials; the result was dropped
    NotConfigured,
    /// Result pushed
    Sent,
    /// Push attempted and failed
    SendFailed(String),
}

impl NotifierOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::ClaimLost => "claim_lost",
            Self::NotConfigured => "not_configured",
            Self::Sent => "sent",
            Self::SendFailed(_) => "send_failed",
        }
    }
}

/// A pending push for one message.
#[derive(Clone)]
pub struct Notifier {
    entry: Arc<MessageEntry>,
    push: Option<Arc<dyn PushSender>>,
    open_id: String,
    config: NotifierConfig,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("message_id", &self.entry.message_id())
            .field("open_id", &self.open_id)
            .field("configured", &self.push.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Notifier {
    /// Notifier for `entry`, pushing to `open_id` through `push`.
    #[must_use]
    pub fn new(
        entry: Arc<MessageEntry>,
        push: Option<Arc<dyn PushSender>>,
        open_id: impl Into<String>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            entry,
            push,
            open_id: open_id.into(),
            config,
        }
    }

    /// Run on its own task.
    pub fn spawn(self) -> JoinHandle<NotifierOutcome> {
        tokio::spawn(self.run())
    }

    /// Wait, then push unless some other channel delivered first.
    pub async fn run(self) -> NotifierOutcome {
        let outcome = self.deliver().await;
        NotifierMetrics::record_outcome(outcome.label());
        outcome
    }

    async fn deliver(&self) -> NotifierOutcome {
        let msg_id = self.entry.message_id();

        if !self
            .entry
            .wait_for_completion(self.config.completion_timeout)
            .await
        {
            tracing::warn!(msg_id = %msg_id, "Handler did not finish in time");
            self.entry.apply(StatusUpdate {
                result: Some(TIMEOUT_REPLY.to_string()),
                error: Some(TIMEOUT_ERROR.to_string()),
                is_completed: Some(true),
                skip_custom_message: None,
            });
            return NotifierOutcome::TimedOut;
        }

        // A retry may still be on its way to pick the result up in-band.
        self.entry
            .wait_for_retry_completion(self.config.retry_grace)
            .await;

        if self.entry.skip_custom_message() {
            tracing::debug!(msg_id = %msg_id, "Result delivered by retry");
            return NotifierOutcome::Skipped;
        }
        if !self.entry.try_claim_result() {
            tracing::debug!(msg_id = %msg_id, "Result already claimed");
            return NotifierOutcome::ClaimLost;
        }

        let Some(push) = &self.push else {
            tracing::error!(
                msg_id = %msg_id,
                "Push credentials not configured; result dropped"
            );
            return NotifierOutcome::NotConfigured;
        };

        let content = self
            .entry
            .result()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| MISSING_RESULT_REPLY.to_string());

        match push.send_text(&self.open_id, &content).await {
            Ok(()) => {
                tracing::info!(msg_id = %msg_id, open_id = %self.open_id, "Result pushed");
                NotifierOutcome::Sent
            }
            Err(e) => {
                tracing::error!(msg_id = %msg_id, error = %e, "Failed to push result");
                NotifierOutcome::SendFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wechat_bridge_testing::RecordingPushSender;

    fn entry() -> Arc<MessageEntry> {
        Arc::new(MessageEntry::new("m1", chrono::Utc::now()))
    }

    fn notifier(entry: &Arc<MessageEntry>, push: Option<Arc<RecordingPushSender>>) -> Notifier {
        Notifier::new(
            Arc::clone(entry),
            push.map(|p| p as Arc<dyn PushSender>),
            "o_user",
            NotifierConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_after_grace_period() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::new());
        entry.apply(StatusUpdate::completed("answer"));

        let outcome = notifier(&entry, Some(push.clone())).run().await;

        assert_eq!(outcome, NotifierOutcome::Sent);
        assert_eq!(push.sent(), vec![("o_user".to_string(), "answer".to_string())]);
        assert!(entry.result_returned());
    }

    #[tokio::test(start_paused = true)]
    async fn stands_down_when_retry_delivered() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::new());
        let handle = notifier(&entry, Some(push.clone())).spawn();

        entry.apply(StatusUpdate::completed("answer"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(entry.try_claim_result());
        entry.set_skip_custom_message(true);
        entry.signal_retry_completion();

        assert_eq!(handle.await.unwrap(), NotifierOutcome::Skipped);
        assert!(push.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_records_timeout() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::new());

        let outcome = notifier(&entry, Some(push.clone())).run().await;

        assert_eq!(outcome, NotifierOutcome::TimedOut);
        let status = entry.snapshot();
        assert!(status.is_completed);
        assert_eq!(status.result.as_deref(), Some(TIMEOUT_REPLY));
        assert_eq!(status.error.as_deref(), Some(TIMEOUT_ERROR));
        assert!(push.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_pushes_fallback() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::new());
        entry.apply(StatusUpdate::completed(""));

        notifier(&entry, Some(push.clone())).run().await;

        assert_eq!(push.sent()[0].1, MISSING_RESULT_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credentials_drop_result() {
        let entry = entry();
        entry.apply(StatusUpdate::completed("answer"));

        let outcome = notifier(&entry, None).run().await;

        assert_eq!(outcome, NotifierOutcome::NotConfigured);
        assert!(entry.result_returned());
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_is_reported() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::failing());
        entry.apply(StatusUpdate::completed("answer"));

        let outcome = notifier(&entry, Some(push)).run().await;

        assert!(matches!(outcome, NotifierOutcome::SendFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn claim_lost_to_another_channel() {
        let entry = entry();
        let push = Arc::new(RecordingPushSender::new());
        entry.apply(StatusUpdate::completed("answer"));
        assert!(entry.try_claim_result());

        let outcome = notifier(&entry, Some(push.clone())).run().await;

        assert_eq!(outcome, NotifierOutcome::ClaimLost);
        assert!(push.sent().is_empty());
    }
}
