//! Change propagation from committed mutations to view observers.
//!
//! Observers register explicitly for a [`ResourceKind`] and receive
//! [`RefreshSignal`]s, never payloads. A single dispatcher task folds every
//! mutation into a per-resource pending mark and flushes once per coalescing
//! window, so an observer sees at most one signal per window however many
//! votes land.
//!
//! Each observer owns a one-slot channel. When the slot is still occupied at
//! flush time the new signal is dropped: the queued one has not been consumed
//! yet, so the re-query it triggers will already see the newer mutation.

use crate::config::PropagationConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vote_events::{MutationEvent, RefreshSignal, ResourceKind};

/// Anything that wants to hear about committed mutations
pub trait ChangeSink: Send + Sync {
    /// Must not block; delivery is best effort
    fn publish(&self, event: MutationEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(u64);

/// An observer's handle; dropping it without `unsubscribe` leaves the slot
/// registered until the next flush notices the closed channel
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    resource: ResourceKind,
    receiver: mpsc::Receiver<RefreshSignal>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    /// Wait for the next refresh; None once unsubscribed
    pub async fn recv(&mut self) -> Option<RefreshSignal> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RefreshSignal> {
        self.receiver.try_recv().ok()
    }
}

struct Observer {
    resource: ResourceKind,
    sender: mpsc::Sender<RefreshSignal>,
}

#[derive(Default)]
struct Registry {
    observers: DashMap<SubscriptionId, Observer>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct ChangePropagator {
    events: mpsc::Sender<MutationEvent>,
    overflowed: Arc<AtomicBool>,
    registry: Arc<Registry>,
}

impl ChangePropagator {
    /// Start the dispatcher. It stops once every propagator clone is dropped.
    pub fn spawn(config: &PropagationConfig) -> (Self, JoinHandle<()>) {
        let (events, receiver) = mpsc::channel(config.event_capacity.max(1));
        let registry = Arc::new(Registry::default());
        let overflowed = Arc::new(AtomicBool::new(false));

        let dispatcher = Dispatcher {
            events: receiver,
            registry: Arc::clone(&registry),
            overflowed: Arc::clone(&overflowed),
            window: config.coalesce_window,
            sequence: 0,
            pending: HashMap::new(),
        };
        let handle = tokio::spawn(dispatcher.run());

        (
            Self {
                events,
                overflowed,
                registry,
            },
            handle,
        )
    }

    pub fn subscribe(&self, resource: ResourceKind) -> Subscription {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(1);
        self.registry
            .observers
            .insert(id, Observer { resource, sender });

        info!(subscription = id.0, %resource, "Observer registered");

        Subscription {
            id,
            resource,
            receiver,
        }
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.observers.remove(&id).is_some();
        if removed {
            info!(subscription = id.0, "Observer deregistered");
        }
        removed
    }

    pub fn observer_count(&self, resource: ResourceKind) -> usize {
        self.registry
            .observers
            .iter()
            .filter(|observer| observer.resource == resource)
            .count()
    }
}

impl ChangeSink for ChangePropagator {
    fn publish(&self, event: MutationEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.overflowed.store(true, Ordering::Release);
                warn!(
                    post_id = %event.post_id(),
                    "Change queue full, next flush refreshes every observer"
                );
            }
            Err(TrySendError::Closed(event)) => {
                debug!(post_id = %event.post_id(), "Change propagator stopped, event dropped");
            }
        }
    }
}

struct Dispatcher {
    events: mpsc::Receiver<MutationEvent>,
    registry: Arc<Registry>,
    overflowed: Arc<AtomicBool>,
    window: Duration,
    // position of the last received mutation
    sequence: u64,
    // resource -> newest sequence not yet signalled
    pending: HashMap<ResourceKind, u64>,
}

impl Dispatcher {
    async fn run(mut self) {
        info!(window_ms = self.window.as_millis() as u64, "Change propagator started");

        let mut deadline: Option<Instant> = None;

        loop {
            let sleep_until =
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                    self.flush();
                    deadline = None;
                }

                received = self.events.recv() => {
                    match received {
                        Some(event) => {
                            self.absorb(event);
                            // Fixed window from the first pending mutation, so a
                            // steady stream cannot postpone the flush forever
                            if deadline.is_none() && !self.pending.is_empty() {
                                deadline = Some(Instant::now() + self.window);
                            }
                        }
                        None => {
                            self.flush();
                            break;
                        }
                    }
                }
            }
        }

        info!("Change propagator stopped");
    }

    fn absorb(&mut self, event: MutationEvent) {
        self.sequence += 1;
        for resource in event.affected_resources() {
            self.pending.insert(resource, self.sequence);
        }
        self.absorb_overflow();
    }

    fn absorb_overflow(&mut self) {
        if self.overflowed.swap(false, Ordering::AcqRel) {
            for resource in ResourceKind::ALL {
                self.pending.insert(resource, self.sequence);
            }
        }
    }

    fn flush(&mut self) {
        self.absorb_overflow();
        if self.pending.is_empty() {
            return;
        }

        let mut delivered = 0usize;
        let mut coalesced = 0usize;
        let mut closed = Vec::new();

        for observer in self.registry.observers.iter() {
            let Some(&sequence) = self.pending.get(&observer.resource) else {
                continue;
            };
            let signal = RefreshSignal {
                resource: observer.resource,
                sequence,
            };
            match observer.sender.try_send(signal) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => coalesced += 1,
                Err(TrySendError::Closed(_)) => closed.push(*observer.key()),
            }
        }

        for id in closed {
            self.registry.observers.remove(&id);
            debug!(subscription = id.0, "Dropped observer with closed channel");
        }

        debug!(
            sequence = self.sequence,
            delivered, coalesced, "Refresh signals flushed"
        );
        self.pending.clear();
    }
}
