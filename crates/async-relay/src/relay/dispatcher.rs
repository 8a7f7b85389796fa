//! Dispatcher - forwards work to a peer and waits for the correlated
//! callback.

use crate::domain::correlation::{CorrelationId, IdGenerator};
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::message::Message;
use crate::domain::pending::{CorrelationRegistry, SlotReceiver};
use crate::middleware::RelayMetrics;
use crate::relay::forwarder::{ForwardError, Forwarder};
use crate::relay::peers::PeerSelector;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Extra time the sweeper grants a slot beyond its submit deadline.
/// The dispatcher's own timeout should always fire first.
const SWEEP_GRACE: Duration = Duration::from_secs(1);

/// How a wait on a slot ended before the deadline
enum WaitOutcome {
    Payload(RelayResult<Bytes>),
    Unreachable(ForwardError),
}

/// Submits work to peers and blocks until the result is called back
pub struct Dispatcher {
    registry: Arc<CorrelationRegistry>,
    forwarder: Arc<dyn Forwarder>,
    peers: Arc<dyn PeerSelector>,
    ids: Arc<dyn IdGenerator>,
    /// URL peers POST their result to
    callback_url: String,
    default_deadline: Duration,
    metrics: Arc<RelayMetrics>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        forwarder: Arc<dyn Forwarder>,
        peers: Arc<dyn PeerSelector>,
        ids: Arc<dyn IdGenerator>,
        callback_url: impl Into<String>,
        default_deadline: Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            registry,
            forwarder,
            peers,
            ids,
            callback_url: callback_url.into(),
            default_deadline,
            metrics,
        }
    }

    /// Submit with the configured default deadline
    pub async fn submit_default(&self, work: String) -> RelayResult<Bytes> {
        self.submit(work, self.default_deadline).await
    }

    /// Forward `work` to a peer and wait up to `deadline` for its callback.
    ///
    /// A peer that answers the forward with an error status is logged but
    /// not fatal: its callback may still arrive. A peer that cannot be
    /// reached at all fails the request with `ForwardingFailed`.
    pub async fn submit(&self, work: String, deadline: Duration) -> RelayResult<Bytes> {
        let started = Instant::now();
        let peer = self.peers.select()?;

        let id = self.ids.next_id();
        let mut slot = self
            .registry
            .create_with_deadline(id.clone(), deadline.saturating_add(SWEEP_GRACE))
            .map_err(|e| match e {
                RelayError::DuplicateId(id) => {
                    error!(correlation_id = %id, "ID generator produced a pending id");
                    RelayError::RegistrationFailed(id)
                }
                other => other,
            })?;
        self.metrics.record_submitted();

        let message = Message::new(id.clone(), self.callback_url.clone(), work);
        let mut forward = self.forwarder.forward(&peer, &message);
        debug!(correlation_id = %id, peer = %peer, "Forwarding message");

        let waited = tokio::time::timeout(deadline, async {
            let mut acked = false;
            loop {
                tokio::select! {
                    payload = &mut slot => return WaitOutcome::Payload(payload),
                    ack = &mut forward, if !acked => {
                        acked = true;
                        match ack {
                            Ok(()) => debug!(correlation_id = %id, "Peer accepted message"),
                            Err(e) if e.is_unreachable() => return WaitOutcome::Unreachable(e),
                            Err(e) => {
                                self.metrics.record_rejected_ack();
                                warn!(
                                    correlation_id = %id,
                                    peer = %peer,
                                    error = %e,
                                    "Peer did not acknowledge message, still waiting for callback"
                                );
                            }
                        }
                    }
                }
            }
        })
        .await;
        drop(forward);

        match waited {
            Ok(WaitOutcome::Payload(Ok(payload))) => {
                self.metrics.record_delivered();
                debug!(
                    correlation_id = %id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Received callback"
                );
                Ok(payload)
            }
            // Slot resolved without payload: reclaimed by the sweeper
            Ok(WaitOutcome::Payload(Err(_))) => {
                self.metrics.record_timeout();
                Err(RelayError::Timeout {
                    id,
                    after: started.elapsed(),
                })
            }
            Ok(WaitOutcome::Unreachable(e)) => {
                if let Err(e) = self.registry.cancel(&id) {
                    debug!(correlation_id = %id, error = %e, "Slot already resolved after failed forward");
                }
                self.metrics.record_forward_failure();
                error!(correlation_id = %id, peer = %peer, error = %e, "Forwarding failed");
                Err(RelayError::ForwardingFailed {
                    target: peer,
                    reason: e.to_string(),
                })
            }
            Err(_) => self.expire(id, slot, deadline).await,
        }
    }

    /// Deadline passed: cancel the slot, unless a delivery beat us to it.
    async fn expire(
        &self,
        id: CorrelationId,
        slot: SlotReceiver,
        deadline: Duration,
    ) -> RelayResult<Bytes> {
        if self.registry.cancel(&id).is_err() {
            if let Some(payload) = slot.take_fulfilled().await {
                self.metrics.record_delivered();
                debug!(correlation_id = %id, "Callback arrived at the deadline");
                return Ok(payload);
            }
        }

        self.metrics.record_timeout();
        warn!(
            correlation_id = %id,
            deadline_ms = deadline.as_millis() as u64,
            "No callback before deadline"
        );
        Err(RelayError::Timeout {
            id,
            after: deadline,
        })
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }
}
