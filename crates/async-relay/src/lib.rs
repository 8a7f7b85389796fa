// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Async Relay - request/response correlation over HTTP callbacks.
//!
//! A relay accepts a request, hands the work to a peer relay, and holds the
//! caller's connection open until the peer POSTs the result back to
//! `/callback`. The correlation ID in every message ties the callback to the
//! waiting request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ASYNC RELAY (host:port)                    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   POST /api          POST /              POST /callback           │
//! │      │                  │                      │                  │
//! │  ┌───┴────────┐   ┌─────┴──────┐        ┌──────┴───────┐          │
//! │  │ Dispatcher │   │ Processor  │        │CallbackIntake│          │
//! │  └───┬────┬───┘   └─────┬──────┘        └──────┬───────┘          │
//! │      │    │ create      │ 202 + spawn          │ deliver          │
//! │      │  ┌─┴─────────────┼──────────────────────┴──┐               │
//! │      │  │        Correlation Registry             │               │
//! │      │  │   (id → oneshot slot, single lock)      │               │
//! │      │  └─────────────────────────────────────────┘               │
//! │      │ forward          │ callback                                │
//! └──────┼──────────────────┼──────────────────────────────────────────┘
//!        ▼                  ▼
//!    peer POST /      originator POST /callback
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use async_relay::{RelayConfig, RelayService};
//!
//! let config = RelayConfig::from_env()?;
//! let service = RelayService::new(config)?;
//! service.start(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod middleware;
pub mod relay;
pub mod router;
pub mod service;

// Re-exports for public API
pub use domain::config::RelayConfig;
pub use domain::correlation::{CorrelationId, IdGenerator, UuidV7Generator};
pub use domain::error::{RelayError, RelayResult, ServiceError};
pub use domain::message::Message;
pub use domain::pending::{CorrelationRegistry, SlotReceiver};
pub use middleware::RelayMetrics;
pub use relay::{CallbackIntake, Dispatcher, Forwarder, HttpForwarder, PeerSelector, Processor};
pub use service::RelayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports_resolve() {
        let id = CorrelationId::parse("abc").unwrap();
        let message = Message::new(id, "http://localhost:3000/callback", "work");
        assert_eq!(message.id.as_str(), "abc");
    }
}
