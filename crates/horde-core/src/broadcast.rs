//! Fan-out of one message stream to many subscribers.
//!
//! The [`Broadcaster`] keeps a private registry of outbound sinks
//! (`tokio::sync::mpsc` senders). Each sink is owned and drained by exactly
//! one consumer, normally a connection session's writer task. The
//! broadcaster only holds a sender handle, so it never closes a sink itself:
//! unregistering a sink drops the handle, and the consumer observes the end
//! of its channel once no other sender is left.
//!
//! # Ordering
//!
//! Sinks are stored in registration order and [`Broadcaster::publish`]
//! visits them in that order. With a single publisher every subscriber sees
//! messages in publish order.
//!
//! # Backpressure
//!
//! Every sink is a bounded queue. What happens when one is full is decided
//! by the [`OverflowPolicy`]:
//!
//! | Policy        | Full sink                                   |
//! |---------------|---------------------------------------------|
//! | `Block`       | publish waits for room (stalls everyone)    |
//! | `DropMessage` | this message is skipped for that sink       |
//! | `Disconnect`  | the sink is unregistered                    |
//!
//! A sink whose consumer has gone away is unregistered under every policy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Identifier of one registered sink. Ids increase in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What [`Broadcaster::publish`] does with a subscriber whose queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the subscriber has room. One slow subscriber stalls the
    /// whole broadcast.
    Block,
    /// Skip this message for the full subscriber; keep it registered.
    DropMessage,
    /// Unregister the full subscriber, which ends its session.
    #[default]
    Disconnect,
}

/// Outcome of one [`Broadcaster::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sinks that accepted the message.
    pub delivered: usize,
    /// Full sinks that skipped the message ([`OverflowPolicy::DropMessage`]).
    pub dropped: usize,
    /// Sinks unregistered during this publish (gone or overflowing).
    pub disconnected: usize,
}

/// Errors returned by the [`Broadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The broadcaster was closed; no further registrations or publishes.
    #[error("broadcaster is closed")]
    Closed,
}

#[derive(Debug)]
struct Registry<M> {
    next_id: u64,
    closed: bool,
    sinks: BTreeMap<SubscriberId, mpsc::Sender<M>>,
}

/// Fan-out hub scoped to one game run.
#[derive(Debug)]
pub struct Broadcaster<M> {
    registry: Mutex<Registry<M>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<M> Broadcaster<M>
where
    M: Clone + Send,
{
    /// Create a broadcaster whose [`subscribe`](Self::subscribe) channels hold
    /// `capacity` messages (at least one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                closed: false,
                sinks: BTreeMap::new(),
            }),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Per-subscriber queue capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The overflow policy.
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Register a sink for future publishes.
    ///
    /// Registration is not idempotent: registering two clones of the same
    /// sender delivers every message twice.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Closed`] after [`close`](Self::close).
    pub fn add_subscriber(&self, sink: mpsc::Sender<M>) -> Result<SubscriberId, BroadcastError> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(BroadcastError::Closed);
        }
        let id = SubscriberId(registry.next_id);
        registry.next_id = registry.next_id.wrapping_add(1);
        registry.sinks.insert(id, sink);
        debug!(subscriber = %id, subscribers = registry.sinks.len(), "Subscriber added");
        Ok(id)
    }

    /// Unregister a sink. Returns whether it was registered.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut registry = self.lock();
        let removed = registry.sinks.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, subscribers = registry.sinks.len(), "Subscriber removed");
        }
        removed
    }

    /// Number of registered sinks.
    pub fn subscriber_count(&self) -> usize {
        self.lock().sinks.len()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Deliver a copy of `message` to every registered sink, in
    /// registration order.
    ///
    /// Returns once every sink accepted the message or was handled by the
    /// overflow policy. Under [`OverflowPolicy::Block`] this waits for the
    /// slowest subscriber; the future may be dropped to abandon the publish.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Closed`] after [`close`](Self::close).
    pub async fn publish(&self, message: M) -> Result<PublishReport, BroadcastError> {
        let targets: Vec<(SubscriberId, mpsc::Sender<M>)> = {
            let registry = self.lock();
            if registry.closed {
                return Err(BroadcastError::Closed);
            }
            registry
                .sinks
                .iter()
                .map(|(id, sink)| (*id, sink.clone()))
                .collect()
        };

        let mut report = PublishReport::default();
        let mut gone = Vec::new();

        for (id, sink) in targets {
            let outcome = match self.policy {
                OverflowPolicy::Block => match sink.send(message.clone()).await {
                    Ok(()) => Delivery::Delivered,
                    Err(_) => Delivery::Gone,
                },
                OverflowPolicy::DropMessage | OverflowPolicy::Disconnect => {
                    match sink.try_send(message.clone()) {
                        Ok(()) => Delivery::Delivered,
                        Err(TrySendError::Full(_)) if self.policy == OverflowPolicy::DropMessage => {
                            Delivery::Dropped
                        }
                        Err(TrySendError::Full(_)) => {
                            warn!(subscriber = %id, "Subscriber queue full, disconnecting");
                            Delivery::Gone
                        }
                        Err(TrySendError::Closed(_)) => Delivery::Gone,
                    }
                }
            };

            match outcome {
                Delivery::Delivered => report.delivered = report.delivered.saturating_add(1),
                Delivery::Dropped => {
                    debug!(subscriber = %id, "Subscriber queue full, message dropped");
                    report.dropped = report.dropped.saturating_add(1);
                }
                Delivery::Gone => gone.push(id),
            }
        }

        if !gone.is_empty() {
            let mut registry = self.lock();
            for id in gone {
                if registry.sinks.remove(&id).is_some() {
                    report.disconnected = report.disconnected.saturating_add(1);
                }
            }
            debug!(
                disconnected = report.disconnected,
                subscribers = registry.sinks.len(),
                "Pruned subscribers after publish"
            );
        }

        Ok(report)
    }

    /// Unregister every sink and reject further registrations and publishes.
    ///
    /// Returns the number of sinks that were registered.
    pub fn close(&self) -> usize {
        let mut registry = self.lock();
        registry.closed = true;
        let count = registry.sinks.len();
        registry.sinks.clear();
        debug!(subscribers = count, "Broadcaster closed");
        count
    }

    fn lock(&self) -> MutexGuard<'_, Registry<M>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> Broadcaster<M>
where
    M: Clone + Send + 'static,
{
    /// Register `sink` and return a guard that unregisters it on drop.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Closed`] after [`close`](Self::close).
    pub fn register(
        self: &Arc<Self>,
        sink: mpsc::Sender<M>,
    ) -> Result<SubscriptionGuard<M>, BroadcastError> {
        let id = self.add_subscriber(sink)?;
        Ok(SubscriptionGuard {
            id,
            broadcaster: Arc::downgrade(self),
        })
    }

    /// Create a sink of the configured capacity, register it, and return
    /// its receiving end.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Closed`] after [`close`](Self::close).
    pub fn subscribe(self: &Arc<Self>) -> Result<Subscription<M>, BroadcastError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let guard = self.register(tx)?;
        Ok(Subscription {
            guard,
            receiver: rx,
        })
    }
}

enum Delivery {
    Delivered,
    Dropped,
    Gone,
}

/// Unregisters its sink from the broadcaster when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard<M>
where
    M: Clone + Send + 'static,
{
    id: SubscriberId,
    broadcaster: Weak<Broadcaster<M>>,
}

impl<M> SubscriptionGuard<M>
where
    M: Clone + Send + 'static,
{
    /// The registered sink's id.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }
}

impl<M> Drop for SubscriptionGuard<M>
where
    M: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.remove_subscriber(self.id);
        }
    }
}

/// A registered sink together with its receiving end.
#[derive(Debug)]
pub struct Subscription<M>
where
    M: Clone + Send + 'static,
{
    guard: SubscriptionGuard<M>,
    receiver: mpsc::Receiver<M>,
}

impl<M> Subscription<M>
where
    M: Clone + Send + 'static,
{
    /// The registered sink's id.
    pub const fn id(&self) -> SubscriberId {
        self.guard.id
    }

    /// Receive the next message. `None` once the sink was unregistered and
    /// drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Receive a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns the channel error when no message is queued.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Split into the unregister-on-drop guard and the raw receiver.
    pub fn into_parts(self) -> (SubscriptionGuard<M>, mpsc::Receiver<M>) {
        (self.guard, self.receiver)
    }
}
