//! Message status registry.
//!
//! One [`MessageEntry`] per platform message id, shared by the request that
//! started the handler, any platform retries of that request, the worker
//! running the handler and the notifier standing by to push the result.
//!
//! # Locking
//!
//! The id map sits behind one coarse lock that is only held for lookups and
//! inserts. Each entry guards its own fields with a small lock, so mutating an
//! entry never blocks lookups of other ids. Locks are always taken map first,
//! entry second. Waiting on completion holds neither.
//!
//! # Housekeeping
//!
//! A sweeper task starts with the registry and removes completed entries
//! older than the retention window. Entries that never complete are kept.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wechat_bridge_core::environment::Clock;

use crate::config::RegistryConfig;
use crate::metrics::RegistryMetrics;
use crate::signal::CompletionSignal;

/// Field changes for an entry. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Reply text
    pub result: Option<String>,
    /// Failure description
    pub error: Option<String>,
    /// Completion marker; only `Some(true)` has an effect, and it fires the
    /// completion signal. A completed entry is never reopened.
    pub is_completed: Option<bool>,
    /// Tells the notifier a retry already delivered the result
    pub skip_custom_message: Option<bool>,
}

impl StatusUpdate {
    /// Successful completion with `result`.
    #[must_use]
    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            is_completed: Some(true),
            ..Self::default()
        }
    }

    /// Failed completion; the user sees `message` and it is kept as the error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            result: Some(message.clone()),
            error: Some(message),
            is_completed: Some(true),
            ..Self::default()
        }
    }
}

/// Point-in-time copy of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageStatus {
    /// Platform message id
    pub message_id: String,
    /// When the first delivery was seen
    pub start_time: DateTime<Utc>,
    /// Reply text, once known
    pub result: Option<String>,
    /// Failure description
    pub error: Option<String>,
    /// Whether the handler finished
    pub is_completed: bool,
    /// Whether some channel has claimed delivery
    pub result_returned: bool,
    /// Whether the notifier should stand down
    pub skip_custom_message: bool,
    /// Platform retries seen so far
    pub retry_count: u32,
}

#[derive(Debug, Default)]
struct EntryState {
    result: Option<String>,
    error: Option<String>,
    is_completed: bool,
    skip_custom_message: bool,
}

/// Shared state for one message id.
#[derive(Debug)]
pub struct MessageEntry {
    message_id: String,
    start_time: DateTime<Utc>,
    retry_count: AtomicU32,
    state: Mutex<EntryState>,
    result_returned: AtomicBool,
    completion: CompletionSignal,
    retry_completion: CompletionSignal,
}

impl MessageEntry {
    /// Fresh, unregistered entry.
    ///
    /// Messages without an id (events) get one of these so the worker and
    /// notifier can still run against it.
    #[must_use]
    pub fn new(message_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            start_time,
            retry_count: AtomicU32::new(0),
            state: Mutex::new(EntryState::default()),
            result_returned: AtomicBool::new(false),
            completion: CompletionSignal::new(),
            retry_completion: CompletionSignal::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Platform message id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// When the first delivery was seen.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Platform retries seen so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    fn next_retry(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Apply `update`. Marking the entry completed fires the completion signal
    /// after the fields are written.
    pub fn apply(&self, update: StatusUpdate) {
        let completed = {
            let mut state = self.state();
            if let Some(result) = update.result {
                state.result = Some(result);
            }
            if let Some(error) = update.error {
                state.error = Some(error);
            }
            if let Some(skip) = update.skip_custom_message {
                state.skip_custom_message = skip;
            }
            // Completion is one-way; `Some(false)` never reopens an entry.
            let completed = update.is_completed == Some(true);
            if completed {
                state.is_completed = true;
            }
            completed
        };
        if completed {
            self.completion.fire();
        }
    }

    /// Atomically claim the right to deliver the result. Exactly one caller
    /// ever gets `true`.
    pub fn try_claim_result(&self) -> bool {
        self.result_returned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether delivery has been claimed.
    #[must_use]
    pub fn result_returned(&self) -> bool {
        self.result_returned.load(Ordering::Acquire)
    }

    /// Whether the handler finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state().is_completed
    }

    /// Reply text, if any.
    #[must_use]
    pub fn result(&self) -> Option<String> {
        self.state().result.clone()
    }

    /// Whether the notifier should stand down.
    #[must_use]
    pub fn skip_custom_message(&self) -> bool {
        self.state().skip_custom_message
    }

    /// Set or clear the notifier stand-down flag.
    pub fn set_skip_custom_message(&self, skip: bool) {
        self.state().skip_custom_message = skip;
    }

    /// Fire the completion signal without touching any field.
    ///
    /// Used when a worker ends without recording an outcome.
    pub fn signal_completion(&self) {
        self.completion.fire();
    }

    /// Wait up to `timeout` for completion. Returns whether it fired.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        self.completion.wait(timeout).await
    }

    /// Tell the notifier the retry sequence is over.
    pub fn signal_retry_completion(&self) {
        self.retry_completion.fire();
    }

    /// Wait up to `timeout` for the retry sequence to end.
    pub async fn wait_for_retry_completion(&self, timeout: Duration) -> bool {
        self.retry_completion.wait(timeout).await
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> MessageStatus {
        let state = self.state();
        MessageStatus {
            message_id: self.message_id.clone(),
            start_time: self.start_time,
            result: state.result.clone(),
            error: state.error.clone(),
            is_completed: state.is_completed,
            result_returned: self.result_returned(),
            skip_custom_message: state.skip_custom_message,
            retry_count: self.retry_count(),
        }
    }
}

/// Result of [`MessageStatusRegistry::track`].
#[derive(Debug, Clone)]
pub struct TrackedMessage {
    /// The shared entry
    pub entry: Arc<MessageEntry>,
    /// Retry number of this delivery; zero for the first
    pub retry_count: u32,
}

impl TrackedMessage {
    /// Whether this delivery is a platform retry.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.retry_count > 0
    }
}

/// Process-wide map of message id to [`MessageEntry`].
pub struct MessageStatusRegistry {
    entries: Mutex<HashMap<String, Arc<MessageEntry>>>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MessageStatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStatusRegistry")
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MessageStatusRegistry {
    /// Create a registry and start its sweeper on the current Tokio runtime.
    ///
    /// Outside a runtime no sweeper is started; [`Self::sweep_expired`] can
    /// still be called by hand.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: RegistryConfig) -> Arc<Self> {
        let registry = Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            config,
            sweeper: Mutex::new(None),
        });

        if tokio::runtime::Handle::try_current().is_ok() {
            let handle = spawn_sweeper(Arc::downgrade(&registry), config.sweep_interval);
            *registry.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        } else {
            tracing::warn!("No Tokio runtime; registry sweeper not started");
        }

        registry
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<MessageEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, message_id: &str) -> Option<Arc<MessageEntry>> {
        self.entries().get(message_id).cloned()
    }

    /// Record a delivery of `message_id`.
    ///
    /// The first delivery creates the entry with retry count zero; each later
    /// delivery increments it. An empty id is never registered and always
    /// looks like a first delivery.
    pub fn track(&self, message_id: &str) -> TrackedMessage {
        if message_id.is_empty() {
            return TrackedMessage {
                entry: Arc::new(MessageEntry::new("", self.clock.now())),
                retry_count: 0,
            };
        }

        let mut entries = self.entries();
        if let Some(entry) = entries.get(message_id) {
            let retry_count = entry.next_retry();
            tracing::info!(msg_id = %message_id, retry_count, "Platform retry");
            return TrackedMessage {
                entry: Arc::clone(entry),
                retry_count,
            };
        }

        let entry = Arc::new(MessageEntry::new(message_id, self.clock.now()));
        entries.insert(message_id.to_string(), Arc::clone(&entry));
        RegistryMetrics::record_size(entries.len());
        drop(entries);

        tracing::debug!(msg_id = %message_id, "Tracking new message");
        TrackedMessage {
            entry,
            retry_count: 0,
        }
    }

    /// Apply `update` to `message_id`, creating the entry if it is missing.
    pub fn update(&self, message_id: &str, update: StatusUpdate) {
        if message_id.is_empty() {
            return;
        }
        let entry = {
            let mut entries = self.entries();
            let entry = entries
                .entry(message_id.to_string())
                .or_insert_with(|| Arc::new(MessageEntry::new(message_id, self.clock.now())));
            Arc::clone(entry)
        };
        entry.apply(update);
    }

    /// Claim delivery of `message_id`. `false` if already claimed or unknown.
    pub fn mark_result_returned(&self, message_id: &str) -> bool {
        self.lookup(message_id)
            .is_some_and(|entry| entry.try_claim_result())
    }

    /// Snapshot of `message_id`, if tracked.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<MessageStatus> {
        self.lookup(message_id).map(|entry| entry.snapshot())
    }

    /// Shared entry for `message_id`, if tracked.
    #[must_use]
    pub fn entry(&self, message_id: &str) -> Option<Arc<MessageEntry>> {
        self.lookup(message_id)
    }

    /// Wait up to `timeout` for `message_id` to complete. `false` on timeout
    /// or if the id is unknown.
    pub async fn wait_for_completion(&self, message_id: &str, timeout: Duration) -> bool {
        match self.lookup(message_id) {
            Some(entry) => entry.wait_for_completion(timeout).await,
            None => false,
        }
    }

    /// Remove completed entries older than the retention window. Returns how
    /// many were removed.
    pub fn sweep_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let now = self.clock.now();

        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !(entry.is_completed() && now - entry.start_time() > retention));
        let removed = before - entries.len();
        RegistryMetrics::record_size(entries.len());
        drop(entries);

        if removed > 0 {
            RegistryMetrics::record_sweep(removed);
            tracing::info!(removed, "Swept expired message entries");
        }
        removed
    }

    /// Number of tracked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweeper.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            tracing::debug!("Registry sweeper stopped");
        }
    }
}

impl Drop for MessageStatusRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic sweep, holding the registry weakly. A panicking pass is logged
/// and the loop carries on with the next tick.
fn spawn_sweeper(registry: Weak<MessageStatusRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let pass = std::panic::catch_unwind(AssertUnwindSafe(|| registry.sweep_expired()));
            if pass.is_err() {
                tracing::error!("Registry sweep panicked; continuing on next tick");
            }
        }
    })
}
