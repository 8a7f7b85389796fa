//! Correlation registry - parks one waiter per correlation ID until its
//! callback arrives.
//!
//! Flow:
//! 1. Dispatcher calls `create()` and keeps the returned `SlotReceiver`
//! 2. Dispatcher forwards the work with the correlation ID attached
//! 3. Callback intake calls `deliver()` with the callback payload
//! 4. Dispatcher awaits the receiver, or calls `cancel()` once its deadline passes
//!
//! Each slot is a single-use promise with states {pending, fulfilled,
//! cancelled}. A slot leaves the map and leaves `Pending` in the same
//! critical section, so every slot still in the map is pending and a failed
//! `cancel()` always observes the delivered state. Only the oneshot send
//! happens outside the lock.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::RelayError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

const PENDING: u8 = 0;
const FULFILLED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Fulfilled,
    Cancelled,
}

impl SlotState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PENDING => SlotState::Pending,
            FULFILLED => SlotState::Fulfilled,
            _ => SlotState::Cancelled,
        }
    }
}

/// State shared by both halves of a slot
#[derive(Debug)]
struct SlotShared {
    state: AtomicU8,
}

impl SlotShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(PENDING),
        })
    }

    /// Move out of `Pending`; only one caller can ever win
    fn resolve(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn state(&self) -> SlotState {
        SlotState::from_raw(self.state.load(Ordering::Acquire))
    }
}

/// Producer half of a slot, owned by the registry map
struct PendingSlot {
    sender: oneshot::Sender<Bytes>,
    shared: Arc<SlotShared>,
    created_at: Instant,
    /// Sweeper expiry, if the creator asked for one
    expires_at: Option<Instant>,
}

impl PendingSlot {
    /// Hand the payload to a waiter already marked fulfilled.
    fn send(self, id: &CorrelationId, payload: Bytes) -> Result<(), RelayError> {
        // Sending on a oneshot never blocks. A dropped receiver means the
        // waiter vanished after the slot was resolved.
        self.sender
            .send(payload)
            .map_err(|_| RelayError::UnknownId(id.clone()))
    }
}

type SlotMap = Mutex<HashMap<CorrelationId, PendingSlot>>;

/// Remove `id` and move it out of `Pending` under one lock acquisition
fn take_resolved(slots: &SlotMap, id: &CorrelationId, to: u8) -> Option<PendingSlot> {
    let mut slots = slots.lock();
    match slots.remove(id) {
        Some(slot) if slot.shared.resolve(to) => Some(slot),
        _ => None,
    }
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Slots created
    pub total_created: AtomicU64,
    /// Payloads handed to a waiter
    pub total_delivered: AtomicU64,
    /// Slots cancelled by their waiter (timeout, disconnect)
    pub total_cancelled: AtomicU64,
    /// Slots removed by the sweeper
    pub total_expired: AtomicU64,
    /// Deliveries rejected for an unknown ID
    pub total_rejected: AtomicU64,
}

impl RegistryStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "created": self.total_created.load(Ordering::Relaxed),
            "delivered": self.total_delivered.load(Ordering::Relaxed),
            "cancelled": self.total_cancelled.load(Ordering::Relaxed),
            "expired": self.total_expired.load(Ordering::Relaxed),
            "rejected": self.total_rejected.load(Ordering::Relaxed),
        })
    }
}

/// Registry mapping correlation IDs to pending slots.
///
/// Constructed once at startup and shared as `Arc<CorrelationRegistry>`.
pub struct CorrelationRegistry {
    slots: Arc<SlotMap>,
    stats: Arc<RegistryStats>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(RegistryStats::default()),
        }
    }

    /// Allocate a slot for `id` and return its receiving end.
    ///
    /// Fails with `DuplicateId` if `id` is already pending; an existing slot
    /// is never overwritten.
    pub fn create(&self, id: CorrelationId) -> Result<SlotReceiver, RelayError> {
        self.insert(id, None)
    }

    /// Like [`create`](Self::create), but lets the sweeper reclaim the slot
    /// once `deadline` has passed.
    pub fn create_with_deadline(
        &self,
        id: CorrelationId,
        deadline: Duration,
    ) -> Result<SlotReceiver, RelayError> {
        self.insert(id, Some(deadline))
    }

    fn insert(
        &self,
        id: CorrelationId,
        deadline: Option<Duration>,
    ) -> Result<SlotReceiver, RelayError> {
        let (tx, rx) = oneshot::channel();
        let shared = SlotShared::new();
        let now = Instant::now();

        {
            let mut slots = self.slots.lock();
            if slots.contains_key(&id) {
                warn!(correlation_id = %id, "Rejected duplicate correlation id");
                return Err(RelayError::DuplicateId(id));
            }
            slots.insert(
                id.clone(),
                PendingSlot {
                    sender: tx,
                    shared: Arc::clone(&shared),
                    created_at: now,
                    // Past the representable range means no expiry
                    expires_at: deadline.and_then(|d| now.checked_add(d)),
                },
            );
        }

        self.stats.total_created.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %id, "Registered pending slot");

        Ok(SlotReceiver {
            id,
            receiver: rx,
            shared,
            slots: Arc::downgrade(&self.slots),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Deliver `payload` to the waiter registered for `id`.
    ///
    /// Fails with `UnknownId` when nothing is pending for `id`, including
    /// every delivery after the first.
    pub fn deliver(&self, id: &CorrelationId, payload: Bytes) -> Result<(), RelayError> {
        // Lock only for removal and resolution, never across the hand-off
        let slot = take_resolved(&self.slots, id, FULFILLED);

        let Some(slot) = slot else {
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %id, "Callback for unknown or expired correlation id");
            return Err(RelayError::UnknownId(id.clone()));
        };

        let waited = slot.created_at.elapsed();
        match slot.send(id, payload) {
            Ok(()) => {
                self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    waited_ms = waited.as_millis() as u64,
                    "Delivered callback payload"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %id, "Waiter abandoned slot before delivery");
                Err(e)
            }
        }
    }

    /// Remove the slot for `id` without delivering a payload.
    ///
    /// Returns `UnknownId` if the slot was already delivered or cancelled.
    pub fn cancel(&self, id: &CorrelationId) -> Result<(), RelayError> {
        match take_resolved(&self.slots, id, CANCELLED) {
            Some(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "Cancelled pending slot");
                Ok(())
            }
            None => Err(RelayError::UnknownId(id.clone())),
        }
    }

    /// Cancel every slot whose sweeper deadline has passed.
    ///
    /// Returns the number of slots removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(CorrelationId, PendingSlot)> = {
            let mut slots = self.slots.lock();
            let ids: Vec<CorrelationId> = slots
                .iter()
                .filter(|(_, slot)| slot.expires_at.is_some_and(|at| at <= now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| match slots.remove(&id) {
                    Some(slot) if slot.shared.resolve(CANCELLED) => Some((id, slot)),
                    _ => None,
                })
                .collect()
        };

        for (id, slot) in &expired {
            warn!(
                correlation_id = %id,
                age_ms = now.duration_since(slot.created_at).as_millis() as u64,
                "Removing expired pending slot"
            );
        }
        self.stats
            .total_expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Number of currently pending slots
    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Check if a correlation ID is pending
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.slots.lock().contains_key(id)
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// Receiving end of a pending slot.
///
/// Resolves to the delivered payload. Dropping it unresolved cancels the
/// registry entry, so an abandoned waiter never leaks a slot.
#[derive(Debug)]
#[must_use = "an unawaited receiver cancels its slot when dropped"]
pub struct SlotReceiver {
    id: CorrelationId,
    receiver: oneshot::Receiver<Bytes>,
    shared: Arc<SlotShared>,
    slots: Weak<SlotMap>,
    stats: Arc<RegistryStats>,
}

impl SlotReceiver {
    pub fn state(&self) -> SlotState {
        self.shared.state()
    }

    /// Take the payload if it was already fulfilled.
    ///
    /// Used after a cancel lost the race against a delivery; waits only for
    /// the in-flight send, which never blocks on the producer side.
    pub async fn take_fulfilled(mut self) -> Option<Bytes> {
        if self.shared.state() != SlotState::Fulfilled {
            return None;
        }
        (&mut self.receiver).await.ok()
    }
}

impl Future for SlotReceiver {
    type Output = Result<Bytes, RelayError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(payload)) => Poll::Ready(Ok(payload)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RelayError::UnknownId(this.id.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SlotReceiver {
    fn drop(&mut self) {
        if self.shared.state() != SlotState::Pending {
            return;
        }
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        if take_resolved(&slots, &self.id, CANCELLED).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %self.id, "Waiter dropped, slot cancelled");
        }
    }
}

/// Background task to sweep expired slots
pub async fn cleanup_task(registry: Arc<CorrelationRegistry>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = registry.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired pending slots");
        }
    }
}
