use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::event_types::{TableSet, TriggerEvent};

pub(crate) const TAP_CAPACITY: usize = 1024;

pub type ListenerId = u64;

struct Listener {
    tables: TableSet,
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

/// Fans "these tables changed" events out to every interested listener.
///
/// Each listener owns an unbounded queue, so `publish` only enqueues and never
/// waits on a consumer. The listener table is locked for the whole fan-out,
/// which gives every listener the same relative order of events.
pub struct TriggerBus {
    listeners: Mutex<HashMap<ListenerId, Listener>>,
    next_id: AtomicU64,
    seq: AtomicU64,
    tap: broadcast::Sender<TriggerEvent>,
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerBus {
    pub fn new() -> Self {
        Self::with_tap_capacity(TAP_CAPACITY)
    }

    pub fn with_tap_capacity(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            tap,
        }
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<ListenerId, Listener>> {
        self.listeners.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("trigger bus listener table poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Broadcast one trigger event for `tables`.
    ///
    /// Returns `None` without publishing when `tables` is empty.
    pub fn publish(&self, tables: TableSet) -> Option<TriggerEvent> {
        if tables.is_empty() {
            return None;
        }

        let mut listeners = self.listeners();
        let event = TriggerEvent {
            id: Uuid::new_v4().to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            tables,
            created_at: Utc::now(),
        };

        let mut woken = 0usize;
        let mut closed = Vec::new();
        for (id, listener) in listeners.iter() {
            if !listener.tables.intersects(&event.tables) {
                continue;
            }
            if listener.tx.send(event.clone()).is_ok() {
                woken += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            listeners.remove(&id);
        }
        drop(listeners);

        tracing::debug!(seq = event.seq, tables = %event.tables, woken, "trigger published");
        if self.tap.send(event.clone()).is_err() {
            tracing::trace!("trigger tap has no receivers");
        }
        Some(event)
    }

    /// Register a listener woken by every event intersecting `tables`.
    pub fn subscribe(self: &Arc<Self>, tables: TableSet) -> TriggerListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners().insert(
            id,
            Listener {
                tables: tables.clone(),
                tx,
            },
        );
        tracing::debug!(listener = id, tables = %tables, "trigger listener registered");
        TriggerListener {
            id,
            tables,
            bus: Arc::clone(self),
            rx,
            closed: false,
        }
    }

    /// Deregister a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners().remove(&id).is_some();
        if removed {
            tracing::debug!(listener = id, "trigger listener unregistered");
        }
        removed
    }

    /// A lossy, monitoring-only copy of every published event.
    pub fn tap(&self) -> broadcast::Receiver<TriggerEvent> {
        self.tap.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

/// Receiving side of one bus registration.
///
/// Dropping the listener unregisters it.
pub struct TriggerListener {
    id: ListenerId,
    tables: TableSet,
    bus: Arc<TriggerBus>,
    rx: mpsc::UnboundedReceiver<TriggerEvent>,
    closed: bool,
}

impl TriggerListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn recv(&mut self) -> Option<TriggerEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<TriggerEvent>> {
        if self.closed {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }

    pub fn try_recv(&mut self) -> Option<TriggerEvent> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<TriggerEvent> {
        if self.closed {
            return None;
        }
        self.rx.blocking_recv()
    }

    /// Stop deliveries and discard anything already queued. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.bus.unsubscribe(self.id);
        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(
                listener = self.id,
                discarded,
                "dropped queued triggers on unsubscribe"
            );
        }
    }
}

impl Drop for TriggerListener {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
