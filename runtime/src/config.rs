//! Timing configuration for the coordinator, notifier and registry.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use wechat_bridge_runtime::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::builder()
//!     .handler_timeout(Duration::from_secs(5))
//!     .retry_wait_ratio(0.8)
//!     .max_http_retries(2)
//!     .build();
//!
//! assert_eq!(config.retry_wait(), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// How long the notifier waits, and how long it lingers for a retry.
///
/// # Default Values
///
/// - `completion_timeout`: 300 seconds
/// - `retry_grace`: 20 seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotifierConfig {
    /// Longest a handler may run before the notifier gives up on it
    pub completion_timeout: Duration,
    /// How long to wait for a platform retry to deliver the result first
    pub retry_grace: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(300),
            retry_grace: Duration::from_secs(20),
        }
    }
}

/// Registry housekeeping.
///
/// # Default Values
///
/// - `sweep_interval`: 60 seconds
/// - `retention`: 600 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Period of the background sweep
    pub sweep_interval: Duration,
    /// Age after which completed entries are dropped
    pub retention: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(600),
        }
    }
}

/// Coordinator timing.
///
/// # Default Values
///
/// - `handler_timeout`: 5 seconds
/// - `retry_wait_ratio`: 0.8 (retries wait 4 seconds)
/// - `max_http_retries`: 2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// How long the first request waits for the handler
    pub handler_timeout: Duration,
    /// Fraction of `handler_timeout` a retry waits
    pub retry_wait_ratio: f64,
    /// Retries answered with "retry later" before the transitional reply
    pub max_http_retries: u32,
    /// Notifier timing
    pub notifier: NotifierConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CoordinatorConfig {
    /// Create a new config builder.
    #[must_use]
    pub const fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder {
            handler_timeout: None,
            retry_wait_ratio: None,
            max_http_retries: None,
            notifier: None,
        }
    }

    /// How long a retry waits for the in-flight handler.
    #[must_use]
    pub fn retry_wait(&self) -> Duration {
        self.handler_timeout.mul_f64(self.retry_wait_ratio.clamp(0.0, 1.0))
    }
}

/// Builder for [`CoordinatorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfigBuilder {
    handler_timeout: Option<Duration>,
    retry_wait_ratio: Option<f64>,
    max_http_retries: Option<u32>,
    notifier: Option<NotifierConfig>,
}

impl CoordinatorConfigBuilder {
    /// Set how long the first request waits.
    #[must_use]
    pub const fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Set the fraction of the handler timeout a retry waits.
    #[must_use]
    pub const fn retry_wait_ratio(mut self, ratio: f64) -> Self {
        self.retry_wait_ratio = Some(ratio);
        self
    }

    /// Set how many retries get "retry later".
    #[must_use]
    pub const fn max_http_retries(mut self, retries: u32) -> Self {
        self.max_http_retries = Some(retries);
        self
    }

    /// Set notifier timing.
    #[must_use]
    pub const fn notifier(mut self, notifier: NotifierConfig) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the [`CoordinatorConfig`].
    #[must_use]
    pub fn build(self) -> CoordinatorConfig {
        CoordinatorConfig {
            handler_timeout: self.handler_timeout.unwrap_or(Duration::from_secs(5)),
            retry_wait_ratio: self.retry_wait_ratio.unwrap_or(0.8),
            max_http_retries: self.max_http_retries.unwrap_or(2),
            notifier: self.notifier.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_budget() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.handler_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_wait(), Duration::from_secs(4));
        assert_eq!(config.max_http_retries, 2);
        assert_eq!(config.notifier.completion_timeout, Duration::from_secs(300));
        assert_eq!(config.notifier.retry_grace, Duration::from_secs(20));

        let registry = RegistryConfig::default();
        assert_eq!(registry.sweep_interval, Duration::from_secs(60));
        assert_eq!(registry.retention, Duration::from_secs(600));
    }

    #[test]
    fn ratio_is_clamped() {
        let config = CoordinatorConfig::builder()
            .handler_timeout(Duration::from_secs(2))
            .retry_wait_ratio(3.0)
            .build();
        assert_eq!(config.retry_wait(), Duration::from_secs(2));
    }
}
