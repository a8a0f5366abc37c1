//! Monitored peers and death recipients.
//!
//! A [`PeerHandle`] stands for another process (a client app, or the remote
//! service seen from a client).  Interested parties register a death recipient
//! closure; when the transport detects that the peer is gone it calls
//! [`PeerHandle::notify_died`], which invokes each recipient at most once.
//! Registering on an already-dead peer fails, so a recipient can never be
//! silently lost.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Closure run when the peer dies.
pub type DeathCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies one registered death recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientId(u64);

struct PeerInner {
    id: Uuid,
    name: String,
    alive: AtomicBool,
    recipients: Mutex<Vec<(RecipientId, DeathCallback)>>,
    next_id: AtomicU64,
}

/// Shared handle to a monitored peer.  Cloning shares the same peer.
#[derive(Clone)]
pub struct PeerHandle {
    inner: Arc<PeerInner>,
}

impl PeerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                id,
                name: name.into(),
                alive: AtomicBool::new(true),
                recipients: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Registers `callback` to run once when the peer dies.
    ///
    /// Returns `None` if the peer is already dead.
    pub fn add_death_recipient<F>(&self, callback: F) -> Option<RecipientId>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut recipients = self.inner.recipients.lock();
        if !self.is_alive() {
            return None;
        }
        let id = RecipientId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        recipients.push((id, Box::new(callback)));
        Some(id)
    }

    /// Unregisters a recipient.  Returns `false` if it was not registered (or
    /// has already fired).
    pub fn remove_death_recipient(&self, id: RecipientId) -> bool {
        let mut recipients = self.inner.recipients.lock();
        let before = recipients.len();
        recipients.retain(|(rid, _)| *rid != id);
        recipients.len() != before
    }

    pub fn recipient_count(&self) -> usize {
        self.inner.recipients.lock().len()
    }

    /// Marks the peer dead and runs every registered recipient.
    ///
    /// Recipients run on the calling thread, outside the internal lock.  A
    /// second call is a no-op.  Returns how many recipients ran.
    pub fn notify_died(&self) -> usize {
        let callbacks = {
            let mut recipients = self.inner.recipients.lock();
            if !self.inner.alive.swap(false, Ordering::AcqRel) {
                return 0;
            }
            std::mem::take(&mut *recipients)
        };
        debug!(
            "peer {} ({}) died; running {} death recipient(s)",
            self.inner.name,
            self.inner.id,
            callbacks.len()
        );
        let count = callbacks.len();
        for (_, callback) in callbacks {
            callback();
        }
        count
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PeerHandle {}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_died_runs_each_recipient_once() {
        // Arrange
        let peer = PeerHandle::new("app");
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            peer.add_death_recipient(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Act
        let first = peer.notify_died();
        let second = peer.notify_died();

        // Assert
        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!peer.is_alive());
    }

    #[test]
    fn test_removed_recipient_does_not_fire() {
        let peer = PeerHandle::new("app");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let id = peer
            .add_death_recipient(move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(peer.remove_death_recipient(id));
        peer.notify_died();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registration_on_dead_peer_is_refused() {
        let peer = PeerHandle::new("app");
        peer.notify_died();
        assert!(peer.add_death_recipient(|| {}).is_none());
    }

    #[test]
    fn test_recipient_may_touch_the_peer_it_watches() {
        let peer = PeerHandle::new("service");
        let observed = Arc::new(Mutex::new(None));
        let peer_clone = peer.clone();
        let observed_clone = Arc::clone(&observed);
        peer.add_death_recipient(move || {
            *observed_clone.lock() = Some(peer_clone.recipient_count());
        });

        peer.notify_died();

        assert_eq!(*observed.lock(), Some(0));
    }

    #[test]
    fn test_clones_compare_equal() {
        let peer = PeerHandle::new("a");
        assert_eq!(peer, peer.clone());
        assert_ne!(peer, PeerHandle::new("a"));
    }
}
