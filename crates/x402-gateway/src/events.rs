//! In-process event bus for the live request feed.
//!
//! Ephemeral by design: state lives only in this process, nothing survives
//! a restart. Fan-out is best-effort and non-blocking: each subscriber owns a
//! bounded queue, and a slow or disconnected subscriber never stalls the
//! emitting request or its neighbours.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Most recent events retained for replay to new subscribers.
pub const MAX_RECENT: usize = 50;
/// Hard cap on concurrent subscribers.
pub const MAX_LISTENERS: usize = 100;
/// Per-subscriber queue depth beyond the replayed history.
const SUBSCRIBER_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Probe,
    Paid,
    Failed,
}

/// One entry in the request feed. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub id: String,
    /// Emission time, unix epoch milliseconds.
    pub ts: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Payer address (paid only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Settlement tx hash (paid only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    /// Error reason (failed only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestEvent {
    fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: unix_millis(),
            kind,
            from: None,
            tx: None,
            error: None,
        }
    }

    pub fn probe() -> Self {
        Self::new(EventKind::Probe)
    }

    pub fn paid(from: Address, tx: Option<String>) -> Self {
        Self {
            from: Some(from),
            tx,
            ..Self::new(EventKind::Paid)
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(EventKind::Failed)
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returned by [`EventBus::subscribe`] when every listener slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtCapacity;

#[derive(Debug)]
struct Inner {
    recent: VecDeque<RequestEvent>,
    /// Live subscribers in subscription order.
    subscribers: Vec<(u64, mpsc::Sender<RequestEvent>)>,
    next_id: u64,
}

/// Bounded publish/subscribe bus shared by the gateway and the SSE feed.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                recent: VecDeque::with_capacity(MAX_RECENT),
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Current number of live subscribers, for admission pre-checks.
    pub fn listener_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Register a subscriber. The recent-buffer is replayed, oldest first,
    /// before any future live event. Fails once [`MAX_LISTENERS`] slots are
    /// taken; never blocks, never evicts an existing subscriber.
    pub fn subscribe(&self) -> Result<Subscription, AtCapacity> {
        let mut inner = self.lock();
        if inner.subscribers.len() >= MAX_LISTENERS {
            return Err(AtCapacity);
        }

        // Queue capacity covers the whole replay, so these sends cannot fail.
        let (tx, rx) = mpsc::channel(MAX_RECENT + SUBSCRIBER_QUEUE);
        for event in &inner.recent {
            let _ = tx.try_send(event.clone());
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));

        Ok(Subscription {
            id,
            rx,
            bus: Arc::clone(&self.inner),
        })
    }

    /// Append to the recent-buffer (oldest evicted first once full) and
    /// deliver to every subscriber in subscription order. A subscriber with
    /// a full queue misses this event; a disconnected one is reaped.
    pub fn emit(&self, event: RequestEvent) {
        let mut inner = self.lock();
        if inner.recent.len() == MAX_RECENT {
            inner.recent.pop_front();
        }
        inner.recent.push_back(event.clone());

        inner
            .subscribers
            .retain(|(_, tx)| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("subscriber queue full, dropping event for slow consumer");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One observer's registration. Dropping it releases the slot.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<RequestEvent>,
    bus: Arc<Mutex<Inner>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RequestEvent> {
        self.rx.recv().await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<RequestEvent>> {
        self.rx.poll_recv(cx)
    }

    pub fn try_recv(&mut self) -> Result<RequestEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self
            .bus
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.subscribers.retain(|(id, _)| *id != self.id);
    }
}
