//! Relay message wire format.
//!
//! `{ "callback": "<url>", "id": "<correlation id>", "body": "<opaque>" }`

use crate::domain::correlation::CorrelationId;
use crate::domain::error::RelayError;
use serde::{Deserialize, Serialize};

/// Unit of work travelling between relay instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Address the peer must POST its result to
    #[serde(default)]
    pub callback: String,
    /// Correlation ID of the waiting request
    pub id: CorrelationId,
    /// Opaque payload
    #[serde(default)]
    pub body: String,
}

impl Message {
    pub fn new(id: CorrelationId, callback: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            callback: callback.into(),
            id,
            body: body.into(),
        }
    }

    /// Parse a message from a raw JSON body.
    ///
    /// Fails with `MalformedPayload` on invalid JSON, a missing `id`, or an
    /// empty `id`.
    pub fn from_slice(raw: &[u8]) -> Result<Self, RelayError> {
        let message: Message = serde_json::from_slice(raw)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?;

        if CorrelationId::parse(message.id.as_str()).is_none() {
            return Err(RelayError::MalformedPayload("empty correlation id".into()));
        }

        Ok(message)
    }

    /// Append processing metadata to the body
    pub fn annotate(&mut self, note: &str) {
        self.body.push_str(", ");
        self.body.push_str(note);
    }
}
