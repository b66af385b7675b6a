//! End-to-end delivery scenarios for the retry coordinator.
//!
//! Time is paused; the platform's redelivery cadence is simulated by issuing
//! deliveries back to back, each one starting when the previous answer
//! (after its own wait) came back.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use wechat_bridge_core::push::PushSender;
use wechat_bridge_core::{EndpointSettings, MessageHandler};
use wechat_bridge_runtime::notifier::{TIMEOUT_ERROR, TIMEOUT_REPLY};
use wechat_bridge_runtime::{
    CoordinatorConfig, Delivery, MessageStatusRegistry, RegistryConfig, RetryCoordinator,
};
use wechat_bridge_testing::{
    ManualClock, RecordingPushSender, ScriptedHandler, init_test_tracing, test_session,
    test_settings, text_message,
};

struct Harness {
    coordinator: RetryCoordinator,
    registry: Arc<MessageStatusRegistry>,
    push: Arc<RecordingPushSender>,
    clock: Arc<ManualClock>,
    handler: Arc<ScriptedHandler>,
    settings: Arc<EndpointSettings>,
}

impl Harness {
    fn new(handler: ScriptedHandler) -> Self {
        init_test_tracing();
        let clock = Arc::new(ManualClock::default());
        let registry = MessageStatusRegistry::new(clock.clone(), RegistryConfig::default());
        let push = Arc::new(RecordingPushSender::new());
        let coordinator = RetryCoordinator::new(
            Arc::clone(&registry),
            Some(push.clone() as Arc<dyn PushSender>),
            CoordinatorConfig::default(),
        );
        Self {
            coordinator,
            registry,
            push,
            clock,
            handler: Arc::new(handler),
            settings: Arc::new(test_settings()),
        }
    }

    async fn deliver(&self, msg_id: &str) -> Delivery {
        self.coordinator
            .process(
                text_message(msg_id, "tell me a story"),
                Arc::clone(&self.handler) as Arc<dyn MessageHandler>,
                test_session(),
                Arc::clone(&self.settings),
            )
            .await
    }
}

#[tokio::test(start_paused = true)]
async fn fast_handler_answers_first_delivery() {
    let h = Harness::new(ScriptedHandler::reply("once upon a time").with_delay(Duration::from_secs(1)));

    assert_eq!(h.deliver("100").await, Delivery::Final("once upon a time".into()));

    let status = h.registry.get("100").unwrap();
    assert!(status.is_completed);
    assert!(status.result_returned);
    assert!(!h.push.wait_for_sends(1, Duration::from_secs(120)).await);
}

#[tokio::test(start_paused = true)]
async fn slow_handler_gets_transitional_reply_then_push() {
    let h = Harness::new(ScriptedHandler::reply("the long answer").with_delay(Duration::from_secs(30)));

    assert_eq!(h.deliver("200").await, Delivery::RetryLater);
    assert_eq!(h.deliver("200").await, Delivery::RetryLater);
    assert_eq!(
        h.deliver("200").await,
        Delivery::Transitional(h.settings.temp_response().to_string())
    );

    assert!(h.push.wait_for_sends(1, Duration::from_secs(60)).await);
    assert_eq!(
        h.push.sent(),
        vec![("o_user".to_string(), "the long answer".to_string())]
    );
    assert_eq!(h.handler.calls(), 1);

    // A straggling redelivery must not deliver a second time.
    assert_eq!(h.deliver("200").await, Delivery::Acknowledge);
    assert!(!h.push.wait_for_sends(2, Duration::from_secs(60)).await);
}

#[tokio::test(start_paused = true)]
async fn handler_finishing_between_retries_is_delivered_in_band() {
    let h = Harness::new(ScriptedHandler::reply("just in time").with_delay(Duration::from_secs(7)));

    assert_eq!(h.deliver("300").await, Delivery::RetryLater);
    assert_eq!(h.deliver("300").await, Delivery::Final("just in time".into()));

    let status = h.registry.get("300").unwrap();
    assert!(status.skip_custom_message);
    assert_eq!(status.retry_count, 1);
    assert!(!h.push.wait_for_sends(1, Duration::from_secs(120)).await);
}

#[tokio::test(start_paused = true)]
async fn notifier_pushes_when_no_retry_arrives() {
    let h = Harness::new(ScriptedHandler::reply("pushed").with_delay(Duration::from_secs(10)));

    assert_eq!(h.deliver("400").await, Delivery::RetryLater);

    assert!(h.push.wait_for_sends(1, Duration::from_secs(60)).await);
    assert!(h.registry.get("400").unwrap().result_returned);
    assert_eq!(h.deliver("400").await, Delivery::Acknowledge);
}

#[tokio::test(start_paused = true)]
async fn handler_outliving_notifier_is_marked_timed_out() {
    let h = Harness::new(ScriptedHandler::reply("too late").with_delay(Duration::from_secs(400)));

    assert_eq!(h.deliver("500").await, Delivery::RetryLater);
    tokio::time::sleep(Duration::from_secs(301)).await;

    let status = h.registry.get("500").unwrap();
    assert!(status.is_completed);
    assert_eq!(status.result.as_deref(), Some(TIMEOUT_REPLY));
    assert_eq!(status.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(h.push.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_handler_reply_is_delivered() {
    let h = Harness::new(ScriptedHandler::fail("backend unavailable"));

    let Delivery::Final(text) = h.deliver("600").await else {
        panic!("expected an in-band reply");
    };
    assert_eq!(text, "处理失败: backend unavailable");
    assert_eq!(h.registry.get("600").unwrap().error.as_deref(), Some(text.as_str()));
}

#[tokio::test(start_paused = true)]
async fn completed_entries_are_purged_after_retention() {
    let h = Harness::new(ScriptedHandler::reply("done"));

    h.deliver("700").await;
    assert!(h.registry.get("700").is_some());

    h.clock.advance(chrono::Duration::seconds(599));
    assert_eq!(h.registry.sweep_expired(), 0);

    h.clock.advance(chrono::Duration::seconds(2));
    assert_eq!(h.registry.sweep_expired(), 1);
    assert!(h.registry.get("700").is_none());
}

#[tokio::test(start_paused = true)]
async fn concurrent_retries_deliver_once() {
    let h = Arc::new(Harness::new(
        ScriptedHandler::reply("only once").with_delay(Duration::from_secs(6)),
    ));

    assert_eq!(h.deliver("800").await, Delivery::RetryLater);

    let retries: Vec<_> = (0..2)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.deliver("800").await })
        })
        .collect();

    let mut finals = 0;
    for retry in retries {
        match retry.await.unwrap() {
            Delivery::Final(text) => {
                assert_eq!(text, "only once");
                finals += 1;
            }
            other => assert_eq!(other, Delivery::Acknowledge),
        }
    }
    assert_eq!(finals, 1);
    assert!(!h.push.wait_for_sends(1, Duration::from_secs(60)).await);
}
