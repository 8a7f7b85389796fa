//! Callback intake - routes inbound callbacks to their waiting request.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::RelayResult;
use crate::domain::message::Message;
use crate::domain::pending::CorrelationRegistry;
use crate::middleware::RelayMetrics;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CallbackIntake {
    registry: Arc<CorrelationRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl CallbackIntake {
    pub fn new(registry: Arc<CorrelationRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Parse a callback and hand the raw payload to its waiter.
    ///
    /// Bad callbacks are rejected with `MalformedPayload` or `UnknownId`;
    /// they never affect other pending requests.
    pub fn deliver(&self, raw: Bytes) -> RelayResult<CorrelationId> {
        let message = Message::from_slice(&raw).inspect_err(|e| {
            self.metrics.record_malformed_callback();
            warn!(error = %e, "Rejected malformed callback");
        })?;

        let id = message.id;
        self.registry.deliver(&id, raw).inspect_err(|_| {
            self.metrics.record_unknown_callback();
        })?;

        debug!(correlation_id = %id, "Callback routed to waiter");
        Ok(id)
    }
}
