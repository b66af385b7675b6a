//! Retry-aware request coordination.
//!
//! The platform gives a webhook five seconds to answer, then redelivers the
//! same message (same `MsgId`) up to two more times. Answering with HTTP 500
//! asks for the next redelivery; answering with an empty 200 ends the
//! sequence quietly.
//!
//! [`RetryCoordinator::process`] turns each delivery into a [`Delivery`]:
//!
//! - The first delivery starts the handler on a worker task and waits
//!   `handler_timeout`. If the handler finishes, its reply goes back in-band.
//!   Otherwise a [`Notifier`] is started as a fallback and the platform is
//!   asked to retry.
//! - Each retry waits `retry_wait` on the same handler. A finished handler
//!   is delivered in-band (once) and the notifier is told to stand down. An
//!   unfinished one gets another "retry later" until the retry budget is
//!   spent, when the transitional reply goes out and the notifier takes over.

use std::sync::Arc;

use wechat_bridge_core::push::PushSender;
use wechat_bridge_core::{EndpointSettings, MessageHandler, Session, WechatMessage};

use crate::config::CoordinatorConfig;
use crate::metrics::CoordinatorMetrics;
use crate::notifier::Notifier;
use crate::registry::{MessageEntry, MessageStatusRegistry};
use crate::worker::{WorkerJob, spawn_worker};

/// Reply when the handler finished without text.
pub const EMPTY_RESULT_REPLY: &str = "抱歉，处理结果为空";

/// What the HTTP layer should send back for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handler reply, delivered in-band
    Final(String),
    /// Transitional reply; the result will be pushed later
    Transitional(String),
    /// Ask the platform to redeliver (HTTP 500, empty body)
    RetryLater,
    /// Already delivered elsewhere (HTTP 200, empty body)
    Acknowledge,
}

impl Delivery {
    /// Reply text to render, if any.
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Final(text) | Self::Transitional(text) => Some(text),
            Self::RetryLater | Self::Acknowledge => None,
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Final(_) => "final",
            Self::Transitional(_) => "transitional",
            Self::RetryLater => "retry_later",
            Self::Acknowledge => "acknowledge",
        }
    }
}

/// Coordinates handler runs across platform redeliveries.
#[derive(Clone)]
pub struct RetryCoordinator {
    registry: Arc<MessageStatusRegistry>,
    push: Option<Arc<dyn PushSender>>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("registry", &self.registry)
            .field("push_configured", &self.push.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl RetryCoordinator {
    /// Coordinator over `registry`. `push` is `None` when the account has no
    /// push credentials.
    #[must_use]
    pub fn new(
        registry: Arc<MessageStatusRegistry>,
        push: Option<Arc<dyn PushSender>>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            push,
            config,
        }
    }

    /// The shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<MessageStatusRegistry> {
        &self.registry
    }

    /// Timing in effect.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Decide the answer to one delivery of `message`.
    pub async fn process(
        &self,
        message: WechatMessage,
        handler: Arc<dyn MessageHandler>,
        session: Session,
        settings: Arc<EndpointSettings>,
    ) -> Delivery {
        let tracked = self.registry.track(message.correlation_id());

        let delivery = if tracked.is_retry() {
            CoordinatorMetrics::record_request("retry");
            self.on_retry(&tracked.entry, tracked.retry_count, &settings)
                .await
        } else {
            CoordinatorMetrics::record_request("first");
            self.on_first(tracked.entry, message, handler, session, settings)
                .await
        };

        CoordinatorMetrics::record_delivery(delivery.label());
        delivery
    }

    async fn on_first(
        &self,
        entry: Arc<MessageEntry>,
        message: WechatMessage,
        handler: Arc<dyn MessageHandler>,
        session: Session,
        settings: Arc<EndpointSettings>,
    ) -> Delivery {
        entry.set_skip_custom_message(false);
        let open_id = message.from_user.clone();

        spawn_worker(WorkerJob {
            entry: Arc::clone(&entry),
            handler,
            message,
            session,
            settings,
        });

        if entry.wait_for_completion(self.config.handler_timeout).await {
            return claim_in_band(&entry);
        }

        tracing::info!(
            msg_id = %entry.message_id(),
            timeout_ms = self.config.handler_timeout.as_millis(),
            "Handler still running; falling back to push"
        );
        Notifier::new(entry, self.push.clone(), open_id, self.config.notifier).spawn();
        Delivery::RetryLater
    }

    async fn on_retry(
        &self,
        entry: &Arc<MessageEntry>,
        retry_count: u32,
        settings: &EndpointSettings,
    ) -> Delivery {
        if entry.wait_for_completion(self.config.retry_wait()).await {
            let delivery = claim_in_band(entry);
            if matches!(delivery, Delivery::Final(_)) {
                entry.set_skip_custom_message(true);
                entry.signal_retry_completion();
            }
            return delivery;
        }

        if retry_count < self.config.max_http_retries {
            tracing::info!(msg_id = %entry.message_id(), retry_count, "Still running; retry later");
            return Delivery::RetryLater;
        }

        tracing::info!(
            msg_id = %entry.message_id(),
            retry_count,
            "Retries exhausted; sending transitional reply"
        );
        entry.signal_retry_completion();
        Delivery::Transitional(settings.temp_response().to_string())
    }
}

fn claim_in_band(entry: &MessageEntry) -> Delivery {
    if !entry.try_claim_result() {
        tracing::debug!(msg_id = %entry.message_id(), "Result already delivered");
        return Delivery::Acknowledge;
    }
    let text = entry
        .result()
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| EMPTY_RESULT_REPLY.to_string());
    Delivery::Final(text)
}
