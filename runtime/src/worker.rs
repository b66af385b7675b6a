//! Background handler execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;
use wechat_bridge_core::{EndpointSettings, MessageHandler, Session, WechatMessage};

use crate::metrics::WorkerMetrics;
use crate::registry::{MessageEntry, StatusUpdate};

/// Prefix of the reply recorded when a handler fails.
pub const FAILURE_PREFIX: &str = "处理失败";

/// Fires completion when dropped, so waiters wake even if the worker is
/// cancelled mid-run.
struct CompletionGuard<'a>(&'a MessageEntry);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.signal_completion();
    }
}

/// Everything a worker needs to run one message.
#[derive(Clone)]
pub struct WorkerJob {
    /// Entry the outcome is recorded on
    pub entry: Arc<MessageEntry>,
    /// Handler for the message type
    pub handler: Arc<dyn MessageHandler>,
    /// The inbound message
    pub message: WechatMessage,
    /// Host capabilities
    pub session: Session,
    /// Endpoint settings
    pub settings: Arc<EndpointSettings>,
}

impl std::fmt::Debug for WorkerJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerJob")
            .field("message_id", &self.entry.message_id())
            .field("msg_type", &self.message.msg_type())
            .finish_non_exhaustive()
    }
}

/// Run `job` on its own task.
pub fn spawn_worker(job: WorkerJob) -> JoinHandle<()> {
    tokio::spawn(run_worker(job))
}

/// Run the handler and record its outcome on the entry.
///
/// Success records the reply. An error or a panic records
/// `"处理失败: <cause>"` as both reply and error. Completion always fires.
pub async fn run_worker(job: WorkerJob) {
    let WorkerJob {
        entry,
        handler,
        message,
        session,
        settings,
    } = job;
    let _guard = CompletionGuard(&entry);
    let started = Instant::now();

    let outcome = AssertUnwindSafe(handler.handle(&message, &session, &settings))
        .catch_unwind()
        .await;

    let elapsed = started.elapsed();
    match outcome {
        Ok(Ok(reply)) => {
            WorkerMetrics::record_run(elapsed, true);
            tracing::info!(
                msg_id = %entry.message_id(),
                elapsed_ms = elapsed.as_millis(),
                len = reply.len(),
                "Handler finished"
            );
            entry.apply(StatusUpdate::completed(reply));
        }
        Ok(Err(e)) => {
            WorkerMetrics::record_run(elapsed, false);
            tracing::error!(msg_id = %entry.message_id(), error = %e, "Handler failed");
            entry.apply(StatusUpdate::failed(format!("{FAILURE_PREFIX}: {e}")));
        }
        Err(payload) => {
            WorkerMetrics::record_run(elapsed, false);
            let cause = panic_message(payload.as_ref());
            tracing::error!(msg_id = %entry.message_id(), cause = %cause, "Handler panicked");
            entry.apply(StatusUpdate::failed(format!("{FAILURE_PREFIX}: {cause}")));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wechat_bridge_testing::{ScriptedHandler, test_session, text_message};

    fn job(handler: ScriptedHandler) -> WorkerJob {
        WorkerJob {
            entry: Arc::new(MessageEntry::new("m1", chrono::Utc::now())),
            handler: Arc::new(handler),
            message: text_message("m1", "hello"),
            session: test_session(),
            settings: Arc::new(EndpointSettings::default()),
        }
    }

    #[tokio::test]
    async fn success_records_reply() {
        let job = job(ScriptedHandler::reply("hi there"));
        let entry = Arc::clone(&job.entry);

        run_worker(job).await;

        let status = entry.snapshot();
        assert!(status.is_completed);
        assert_eq!(status.result.as_deref(), Some("hi there"));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn error_records_failure_text() {
        let job = job(ScriptedHandler::fail("backend down"));
        let entry = Arc::clone(&job.entry);

        run_worker(job).await;

        let status = entry.snapshot();
        assert!(status.is_completed);
        assert_eq!(status.result, status.error);
        assert!(status.result.unwrap().starts_with("处理失败: "));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let job = job(ScriptedHandler::panicking("kaboom"));
        let entry = Arc::clone(&job.entry);

        spawn_worker(job).await.unwrap();

        assert!(entry.wait_for_completion(Duration::from_millis(1)).await);
        assert_eq!(entry.result().as_deref(), Some("处理失败: kaboom"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_worker_still_fires_completion() {
        let job = job(ScriptedHandler::reply("late").with_delay(Duration::from_secs(60)));
        let entry = Arc::clone(&job.entry);

        let handle = spawn_worker(job);
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.abort();
        let _ = handle.await;

        assert!(entry.wait_for_completion(Duration::from_millis(1)).await);
        assert!(!entry.is_completed());
    }
}
