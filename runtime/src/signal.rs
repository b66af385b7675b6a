//! Single-fire completion signal.

use std::time::Duration;

use tokio::sync::watch;

/// A latch that fires at most once and can be awaited by any number of tasks,
/// including tasks that start waiting after it fired.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Unfired signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait up to `timeout` for the signal. Returns whether it fired.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|fired| *fired))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_once() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn late_waiters_see_fired_signal() {
        let signal = CompletionSignal::new();
        signal.fire();
        assert!(signal.wait(Duration::from_millis(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let signal = CompletionSignal::new();
        assert!(!signal.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_every_waiter() {
        let signal = Arc::new(CompletionSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.wait(Duration::from_secs(10)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        signal.fire();

        for waiter in waiters {
            assert!(waiter.await.unwrap_or(false));
        }
    }
}
