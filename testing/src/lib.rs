//! # WeChat Bridge Testing
//!
//! Test doubles and fixtures for the WeChat webhook bridge.
//!
//! This crate provides:
//! - Clocks tests can pin or move by hand
//! - A scripted chat backend that records every request
//! - A push sender that records what would have been sent
//! - A message handler with scripted delay, failure or panic
//! - Message and settings fixtures
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wechat_bridge_testing::{ManualClock, text_message};
//! use wechat_bridge_core::environment::Clock;
//!
//! let clock = Arc::new(ManualClock::default());
//! let start = clock.now();
//! clock.advance(chrono::Duration::seconds(30));
//! assert_eq!(clock.now() - start, chrono::Duration::seconds(30));
//!
//! let message = text_message("1001", "hello");
//! assert_eq!(message.correlation_id(), "1001");
//! ```

use chrono::{DateTime, Utc};
use wechat_bridge_core::environment::Clock;

pub mod chat_mocks;
pub mod fixtures;
pub mod handler_mocks;
pub mod push_mocks;

/// Clock implementations for tests.
pub mod mocks {
    use std::sync::{Mutex, PoisonError};

    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use wechat_bridge_testing::mocks::FixedClock;
    /// use wechat_bridge_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Starts at [`epoch`].
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(epoch())
        }
    }

    impl ManualClock {
        /// Clock reading `time` until advanced.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }
}

/// Install a compact `tracing` subscriber for test output.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

// Re-export commonly used items
pub use chat_mocks::ScriptedChatBackend;
pub use fixtures::{
    encrypted_settings, event_message, message_with, session_with, test_session, test_settings,
    text_message, TEST_AES_KEY, TEST_APP_ID, TEST_TOKEN,
};
pub use handler_mocks::ScriptedHandler;
pub use mocks::{FixedClock, ManualClock, epoch, test_clock};
pub use push_mocks::RecordingPushSender;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_does_not_move() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(clock.now() - epoch(), chrono::Duration::minutes(10));
    }
}
