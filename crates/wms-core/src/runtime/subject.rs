//! Generic listener fan-out.
//!
//! One `Subject<E>` replaces a family of bespoke listener interfaces (screen
//! connection, screen change, group change, focus change): the event payload
//! type is the only thing that differs between them.
//!
//! `notify` iterates a snapshot of the listener list taken under the lock and
//! releases the lock before calling out, so a listener may subscribe or
//! unsubscribe (itself or others) from inside its own callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Receives events of type `E`.
pub trait Listener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// Handle returned by [`Subject::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A set of listeners for one event type.
pub struct Subject<E> {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener<E>>)>>,
    next_id: AtomicU64,
}

impl<E> Default for Subject<E> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

fn same_listener<E>(a: &Arc<dyn Listener<E>>, b: &Arc<dyn Listener<E>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl<E> Subject<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener`.  Returns `None` if this exact listener is already
    /// registered.
    pub fn subscribe(&self, listener: Arc<dyn Listener<E>>) -> Option<ListenerId> {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|(_, l)| same_listener(l, &listener)) {
            warn!("listener already registered; ignoring duplicate");
            return None;
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        listeners.push((id, listener));
        Some(id)
    }

    /// Removes the listener registered under `id`.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Removes `listener` by identity.
    pub fn unsubscribe_listener(&self, listener: &Arc<dyn Listener<E>>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(_, l)| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Delivers `event` to every listener registered when the call began.
    /// Returns the number of listeners notified.
    pub fn notify(&self, event: &E) -> usize {
        let snapshot: Vec<Arc<dyn Listener<E>>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &snapshot {
            listener.on_event(event);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
