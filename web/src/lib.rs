//! Axum endpoints for the WeChat webhook bridge.
//!
//! # Request Flow
//!
//! 1. **Verify / decrypt** the platform envelope ([`MessageCrypto`](wechat_bridge_core::crypto::MessageCrypto))
//! 2. **Parse** the XML message
//! 3. **Coordinate** the delivery through the
//!    [`RetryCoordinator`](wechat_bridge_runtime::RetryCoordinator)
//! 4. **Render** the passive reply, encrypted if the request was
//! 5. **Map** the outcome onto the platform's status contract
//!
//! # Example
//!
//! ```ignore
//! use wechat_bridge_web::{AppState, build_router};
//!
//! let state = AppState::new(settings, coordinator, HandlerRegistry::new(), session, clock);
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::EndpointError;
pub use router::{REQUEST_ID_HEADER, build_router};
pub use state::AppState;
