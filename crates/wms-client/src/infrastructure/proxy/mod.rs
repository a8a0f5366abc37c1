//! Lazily resolved, death-guarded handles to remote services.
//!
//! # How a call reaches the service (for beginners)
//!
//! A client never holds the service object directly.  It holds a
//! [`ProxyAdapter`], which asks a [`ServiceDirectory`] for the service the
//! first time it is needed and caches the answer:
//!
//! ```text
//! adapter.call(sentinel, |svc| svc.op())
//!   └─ ensure_connected()
//!        ├─ cached?            -> use it
//!        └─ directory lookup   -> downcast to S
//!             └─ remote peer?  -> add death recipient
//!   └─ not connected           -> return sentinel (no retry)
//! ```
//!
//! When the remote peer dies its death recipient calls
//! [`ProxyAdapter::invalidate`] and the adapter tells its invalidation
//! listeners.  The next call resolves the service again.
//!
//! # Locking
//!
//! The cached handle sits behind a re-entrant lock: a death recipient may
//! fire on a thread that is already inside `ensure_connected`, and
//! invalidation listeners may call straight back into the adapter.  The lock
//! is not held while a service method runs.

pub mod directory;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use wms_core::runtime::peer::RecipientId;
use wms_core::{PeerHandle, Subject};

// ── Directory ─────────────────────────────────────────────────────────────────

/// What a directory lookup returns: a type-erased service object plus, for a
/// genuine cross-process proxy, the peer that hosts it.
///
/// The object is stored as an `Arc<S>` inside the `Any`, so
/// [`ProxyAdapter<S>`] can recover it with a downcast.
#[derive(Clone)]
pub struct RemoteObject {
    handle: Arc<dyn Any + Send + Sync>,
    peer: Option<PeerHandle>,
}

impl RemoteObject {
    /// An object living in this process.  Nothing can die under it, so no
    /// death recipient is ever registered.
    pub fn local<S>(service: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            handle: Arc::new(service),
            peer: None,
        }
    }

    /// A proxy for an object hosted by `peer`.
    pub fn remote<S>(service: Arc<S>, peer: PeerHandle) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            handle: Arc::new(service),
            peer: Some(peer),
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.peer.is_some()
    }

    fn cast<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.handle.downcast_ref::<Arc<S>>().cloned()
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("peer", &self.peer.as_ref().map(PeerHandle::name))
            .finish_non_exhaustive()
    }
}

/// Looks services up by name.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceDirectory: Send + Sync {
    /// Returns the service registered under `name`, if any.
    fn get_service(&self, name: &str) -> Option<RemoteObject>;
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// Why a connection attempt failed.  Only ever logged; callers see a bool.
#[derive(Debug, Error)]
enum ConnectError {
    #[error("service {0} is not registered")]
    NotRegistered(String),
    #[error("service {0} does not implement the expected interface")]
    WrongInterface(String),
    #[error("peer hosting service {0} is already dead")]
    PeerDead(String),
}

/// Published after the cached handle was dropped because its peer died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInvalidated {
    pub service_name: String,
}

struct DeathWatch {
    peer: PeerHandle,
    recipient: RecipientId,
}

struct ProxyState<S: ?Sized> {
    proxy: Option<Arc<S>>,
    death: Option<DeathWatch>,
}

/// Caches one live handle to service `S` at a time.  See the module
/// documentation.
pub struct ProxyAdapter<S: ?Sized> {
    service_name: String,
    directory: Arc<dyn ServiceDirectory>,
    state: ReentrantMutex<RefCell<ProxyState<S>>>,
    invalidated: Subject<ProxyInvalidated>,
    weak_self: Weak<ProxyAdapter<S>>,
}

impl<S> ProxyAdapter<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub fn new(service_name: impl Into<String>, directory: Arc<dyn ServiceDirectory>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| Self {
            service_name: service_name.into(),
            directory,
            state: ReentrantMutex::new(RefCell::new(ProxyState {
                proxy: None,
                death: None,
            })),
            invalidated: Subject::new(),
            weak_self: weak.clone(),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Notified after a remote death has invalidated the handle.
    pub fn invalidation_listeners(&self) -> &Subject<ProxyInvalidated> {
        &self.invalidated
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().borrow().proxy.is_some()
    }

    /// Makes sure a valid handle is cached, resolving one if needed.
    ///
    /// Returns `false`, with nothing cached, if the service is not
    /// registered, does not implement `S`, or its peer is already dead.
    pub fn ensure_connected(&self) -> bool {
        let guard = self.state.lock();
        if guard.borrow().proxy.is_some() {
            return true;
        }
        match self.connect() {
            Ok((proxy, death)) => {
                let mut state = guard.borrow_mut();
                state.proxy = Some(proxy);
                state.death = death;
                info!("connected to service {}", self.service_name);
                true
            }
            Err(e) => {
                warn!("cannot connect: {e}");
                false
            }
        }
    }

    fn connect(&self) -> Result<(Arc<S>, Option<DeathWatch>), ConnectError> {
        let remote = self
            .directory
            .get_service(&self.service_name)
            .ok_or_else(|| ConnectError::NotRegistered(self.service_name.clone()))?;
        let proxy = remote
            .cast::<S>()
            .ok_or_else(|| ConnectError::WrongInterface(self.service_name.clone()))?;

        let Some(peer) = remote.peer else {
            debug!("service {} is local; no death watch", self.service_name);
            return Ok((proxy, None));
        };
        let weak = self.weak_self.clone();
        let recipient = peer
            .add_death_recipient(move || {
                if let Some(adapter) = weak.upgrade() {
                    adapter.on_remote_died();
                }
            })
            .ok_or_else(|| ConnectError::PeerDead(self.service_name.clone()))?;
        Ok((proxy, Some(DeathWatch { peer, recipient })))
    }

    /// Drops the cached handle and its death recipient.  The next call
    /// resolves the service again.
    pub fn invalidate(&self) {
        let guard = self.state.lock();
        let death = {
            let mut state = guard.borrow_mut();
            state.proxy = None;
            state.death.take()
        };
        if let Some(watch) = death {
            // Already gone when invalidating from the recipient itself.
            watch.peer.remove_death_recipient(watch.recipient);
        }
    }

    fn on_remote_died(&self) {
        warn!("service {} died", self.service_name);
        self.invalidate();
        self.invalidated.notify(&ProxyInvalidated {
            service_name: self.service_name.clone(),
        });
    }

    /// Runs `f` against the service, or returns `sentinel` if it cannot be
    /// reached right now.  Never retries.
    pub fn call<R>(&self, sentinel: R, f: impl FnOnce(&S) -> R) -> R {
        let proxy = {
            let guard = self.state.lock();
            if !self.ensure_connected() {
                return sentinel;
            }
            let proxy = guard.borrow().proxy.clone();
            proxy
        };
        match proxy {
            Some(proxy) => f(&proxy),
            None => sentinel,
        }
    }
}

impl<S: ?Sized> Drop for ProxyAdapter<S> {
    fn drop(&mut self) {
        if let Some(watch) = self.state.get_mut().get_mut().death.take() {
            watch.peer.remove_death_recipient(watch.recipient);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
