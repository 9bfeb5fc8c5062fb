//! Outbound delivery tracking.
//!
//! Holds the offline queue and the set of envelopes awaiting acknowledgment.
//! Never transmits and never retries on its own: `send` tells the caller
//! whether to transmit now or that the message was queued, and the caller
//! decides what to do with timeouts.
//!
//! Delivery is at-least-once. A message resent after a timeout keeps its
//! envelope id so the server can deduplicate it.

use std::{
    collections::{HashMap, VecDeque},
    ops::Sub,
    time::Duration,
};

use lawbuddy_proto::{Envelope, EnvelopeId};

/// Time to wait for an acknowledgment before reporting a timeout.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum queued messages while offline. Oldest are dropped beyond this.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Number of acknowledgments in the rolling round-trip average.
const ROUND_TRIP_WINDOW: usize = 50;

/// Delivery configuration
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Acknowledgment deadline
    pub ack_timeout: Duration,
    /// Offline queue bound
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { ack_timeout: DEFAULT_ACK_TIMEOUT, queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

/// An outbound envelope plus its delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Envelope to transmit
    pub envelope: Envelope,
    /// Track an acknowledgment for this envelope
    pub expect_ack: bool,
}

impl QueuedMessage {
    /// Envelope id, if the envelope carries one.
    pub fn id(&self) -> Option<&EnvelopeId> {
        self.envelope.id.as_ref()
    }
}

/// Envelope awaiting acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck<I> {
    /// When the envelope was handed to the transport
    pub sent_at: I,
}

/// Result of [`DeliveryTracker::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Connected: the caller transmits this message now
    Transmit(QueuedMessage),

    /// Offline: the message joined the queue
    Queued {
        /// Oldest message evicted to make room, if the queue was full
        dropped: Option<QueuedMessage>,
    },
}

/// An acknowledgment matched a pending envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Acknowledged envelope
    pub id: EnvelopeId,
    /// Time from transmit to acknowledgment
    pub round_trip: Duration,
}

/// Offline queue plus pending-ack bookkeeping.
#[derive(Debug, Clone)]
pub struct DeliveryTracker<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: DeliveryConfig,
    queue: VecDeque<QueuedMessage>,
    pending: HashMap<EnvelopeId, PendingAck<I>>,
    round_trips: VecDeque<Duration>,
}

impl<I> DeliveryTracker<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty tracker.
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            round_trips: VecDeque::with_capacity(ROUND_TRIP_WINDOW),
        }
    }

    /// Route an outbound message.
    ///
    /// When `connected` and nothing is queued, the message is returned for
    /// immediate transmit and its PendingAck starts now. Otherwise it joins
    /// the back of the queue; its PendingAck starts when the queue is
    /// flushed. A connected caller that gets `Queued` should flush.
    pub fn send(&mut self, message: QueuedMessage, connected: bool, now: I) -> SendOutcome {
        if connected && self.queue.is_empty() {
            self.track(&message, now);
            return SendOutcome::Transmit(message);
        }

        self.queue.push_back(message);
        let dropped = if self.queue.len() > self.config.queue_capacity {
            self.queue.pop_front()
        } else {
            None
        };

        debug_assert!(self.queue.len() <= self.config.queue_capacity);
        SendOutcome::Queued { dropped }
    }

    /// Match an acknowledgment. Unknown or already-expired ids are ignored.
    pub fn acknowledge(&mut self, id: &EnvelopeId, now: I) -> Option<Delivered> {
        let pending = self.pending.remove(id)?;
        let round_trip = now - pending.sent_at;

        if self.round_trips.len() == ROUND_TRIP_WINDOW {
            self.round_trips.pop_front();
        }
        self.round_trips.push_back(round_trip);

        Some(Delivered { id: id.clone(), round_trip })
    }

    /// Remove every PendingAck older than the ack timeout.
    ///
    /// Returned oldest first.
    pub fn expire(&mut self, now: I) -> Vec<EnvelopeId> {
        let timeout = self.config.ack_timeout;
        let mut expired: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, ack)| now - ack.sent_at >= timeout)
            .map(|(id, ack)| (ack.sent_at, id.clone()))
            .collect();
        expired.sort();

        expired
            .into_iter()
            .map(|(_, id)| {
                self.pending.remove(&id);
                id
            })
            .collect()
    }

    /// Drain the queue in FIFO order for transmit, starting the PendingAck
    /// of each drained message at `now`.
    pub fn take_flush(&mut self, now: I) -> Vec<QueuedMessage> {
        let drained: Vec<_> = self.queue.drain(..).collect();
        for message in &drained {
            self.track(message, now);
        }
        drained
    }

    /// Return messages the transport failed to send to the head of the
    /// queue, keeping their order, and forget their PendingAcks.
    ///
    /// If the queue overflows, the oldest entries are evicted from the front
    /// (starting with the requeued messages) and returned.
    pub fn requeue_front(&mut self, unsent: Vec<QueuedMessage>) -> Vec<QueuedMessage> {
        for message in unsent.into_iter().rev() {
            if let Some(id) = message.id() {
                self.pending.remove(id);
            }
            self.queue.push_front(message);
        }

        let mut dropped = Vec::new();
        while self.queue.len() > self.config.queue_capacity {
            if let Some(oldest) = self.queue.pop_front() {
                dropped.push(oldest);
            }
        }
        dropped
    }

    /// Messages waiting for a connection.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Ids of queued messages, oldest first.
    pub fn queued_ids(&self) -> Vec<EnvelopeId> {
        self.queue.iter().filter_map(QueuedMessage::id).cloned().collect()
    }

    /// Envelopes awaiting acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` is awaiting acknowledgment.
    pub fn is_pending(&self, id: &EnvelopeId) -> bool {
        self.pending.contains_key(id)
    }

    /// Mean round trip over the most recent acknowledgments.
    pub fn average_round_trip(&self) -> Option<Duration> {
        if self.round_trips.is_empty() {
            return None;
        }
        let total: Duration = self.round_trips.iter().sum();
        Some(total / self.round_trips.len() as u32)
    }

    fn track(&mut self, message: &QueuedMessage, now: I) {
        if message.expect_ack
            && let Some(id) = message.id()
        {
            self.pending.insert(id.clone(), PendingAck { sent_at: now });
        }
    }
}
