//! Relay error types.
//!
//! `RelayError` is request scoped and always ends up as an HTTP response.
//! `ServiceError` covers startup failures, the only errors allowed to stop
//! the process.

use crate::domain::config::ConfigError;
use crate::domain::correlation::CorrelationId;
use std::time::Duration;

/// Stable error codes used in JSON error bodies
pub mod codes {
    pub const DUPLICATE_ID: &str = "duplicate_id";
    pub const REGISTRATION_FAILED: &str = "registration_failed";
    pub const UNKNOWN_ID: &str = "unknown_id";
    pub const MALFORMED_PAYLOAD: &str = "malformed_payload";
    pub const TIMEOUT: &str = "timeout";
    pub const FORWARDING_FAILED: &str = "forwarding_failed";
    pub const NO_PEER_AVAILABLE: &str = "no_peer_available";
}

/// Request-level relay errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// A slot for this ID is already pending
    #[error("correlation id {0} is already pending")]
    DuplicateId(CorrelationId),

    /// The dispatcher could not register its slot (ID generator defect)
    #[error("unable to register correlation id {0}: id already pending")]
    RegistrationFailed(CorrelationId),

    /// No slot is pending for this ID (late, duplicate or forged callback)
    #[error("no pending request for correlation id {0}")]
    UnknownId(CorrelationId),

    /// Body is not a valid relay message
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// No callback arrived before the deadline
    #[error("request {id} timed out after {}ms", .after.as_millis())]
    Timeout { id: CorrelationId, after: Duration },

    /// Outbound call failed at the transport level
    #[error("forwarding to {target} failed: {reason}")]
    ForwardingFailed { target: String, reason: String },

    /// Peer selection produced no target
    #[error("no peer available: {0}")]
    NoPeerAvailable(String),
}

impl RelayError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::DuplicateId(_) => codes::DUPLICATE_ID,
            RelayError::RegistrationFailed(_) => codes::REGISTRATION_FAILED,
            RelayError::UnknownId(_) => codes::UNKNOWN_ID,
            RelayError::MalformedPayload(_) => codes::MALFORMED_PAYLOAD,
            RelayError::Timeout { .. } => codes::TIMEOUT,
            RelayError::ForwardingFailed { .. } => codes::FORWARDING_FAILED,
            RelayError::NoPeerAvailable(_) => codes::NO_PEER_AVAILABLE,
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::DuplicateId(_) | RelayError::RegistrationFailed(_) => 500,
            RelayError::UnknownId(_) => 404,
            RelayError::MalformedPayload(_) => 400,
            RelayError::Timeout { .. } => 504,
            RelayError::ForwardingFailed { .. } => 502,
            RelayError::NoPeerAvailable(_) => 503,
        }
    }

    /// JSON error body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Startup and server lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("server bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client construction error
    #[error("http client error: {0}")]
    Client(String),

    /// Server terminated with an I/O error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
