//! # WeChat Bridge Core
//!
//! Domain types and wire handling for the WeChat official-account webhook bridge.
//!
//! This crate is runtime-agnostic: it knows how to read an inbound message,
//! verify and unwrap the platform's AES envelope, turn a message into a reply
//! through a [`handler::MessageHandler`], and render that reply back onto the
//! wire. It does not know how requests are retried or how slow work is
//! scheduled; that lives in `wechat-bridge-runtime`.
//!
//! ## Layout
//!
//! - [`message`]: the inbound message model
//! - [`parser`] / [`formatter`]: XML in, XML out
//! - [`crypto`]: signatures and the AES-CBC envelope
//! - [`chat`]: the conversational backend seam
//! - [`handler`] / [`handlers`]: per message-type reply logic
//! - [`storage`]: conversation id persistence
//! - [`push`]: the out-of-band customer-service message seam
//! - [`environment`]: injectable clock

pub mod chat;
pub mod crypto;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod handlers;
pub mod message;
pub mod parser;
pub mod push;
pub mod settings;
pub mod storage;

pub use error::{ChatError, CryptoError, HandlerError, ParseError, PushError, StorageError};
pub use handler::{MessageHandler, Session};
pub use message::{MessageBody, WechatMessage};
pub use settings::EndpointSettings;

/// Environment traits for dependency injection.
///
/// Anything that reads the outside world in a way tests want to control
/// is expressed as a trait here.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait for getting current time
    ///
    /// Allows tests to control time instead of using system time.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
