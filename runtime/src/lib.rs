//! # WeChat Bridge Runtime
//!
//! Decides, for each webhook delivery, whether the reply goes back in-band,
//! the platform is asked to retry, or the result is pushed later.
//!
//! ## Core Components
//!
//! - **[`MessageStatusRegistry`]**: shared per-message state, keyed by message id
//! - **[`RetryCoordinator`]**: turns a delivery into a [`Delivery`]
//! - **Worker**: runs the handler off the request path
//! - **[`Notifier`]**: pushes results the HTTP channel could not return
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wechat_bridge_core::environment::SystemClock;
//! use wechat_bridge_runtime::{CoordinatorConfig, MessageStatusRegistry, RegistryConfig, RetryCoordinator};
//!
//! # async fn example() {
//! let registry = MessageStatusRegistry::new(Arc::new(SystemClock), RegistryConfig::default());
//! let coordinator = RetryCoordinator::new(registry, None, CoordinatorConfig::default());
//! # let _ = coordinator;
//! # }
//! ```

/// Timing configuration
pub mod config;

/// Retry-aware request coordination
pub mod coordinator;

/// Readiness reporting
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Out-of-band result delivery
pub mod notifier;

/// Per-message shared state
pub mod registry;

/// Single-fire completion signal
pub mod signal;

/// Background handler execution
pub mod worker;

pub use config::{CoordinatorConfig, NotifierConfig, RegistryConfig};
pub use coordinator::{Delivery, EMPTY_RESULT_REPLY, RetryCoordinator};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use notifier::{Notifier, NotifierOutcome};
pub use registry::{MessageEntry, MessageStatus, MessageStatusRegistry, StatusUpdate, TrackedMessage};
pub use signal::CompletionSignal;
