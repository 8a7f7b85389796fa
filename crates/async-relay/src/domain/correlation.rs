//! Correlation ID for request/callback matching.
//!
//! Locally generated IDs are UUID v7 strings, but the registry treats every
//! ID as an opaque token: a peer echoes back whatever it was given.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque token linking a submitted request to its eventual callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new time-ordered correlation ID (UUID v7)
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap an ID received from the wire.
    ///
    /// Returns `None` for empty or whitespace-only strings.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh correlation IDs.
///
/// Implementations must never return an ID that is still pending; the
/// dispatcher reports a collision as a generator defect.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> CorrelationId;
}

/// Default generator backed by UUID v7
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> CorrelationId {
        CorrelationId::generate()
    }
}
