//! Domain types for the relay.
//!
//! Configuration, errors, the wire message and the correlation registry.

pub mod config;
pub mod correlation;
pub mod error;
pub mod message;
pub mod pending;

// Re-exports for convenience
pub use config::{ConfigError, RelayConfig};
pub use correlation::{CorrelationId, IdGenerator, UuidV7Generator};
pub use error::{RelayError, RelayResult, ServiceError};
pub use message::Message;
pub use pending::{CorrelationRegistry, RegistryStats, SlotReceiver, SlotState};
