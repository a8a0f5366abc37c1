//! SessionRegistry: the canonical map from persistent id to session.
//!
//! # Ownership (for beginners)
//!
//! The registry is the only owner of [`SessionEntity`] values.  Parent, dialog
//! and sub-session relationships are stored as ids and resolved through the
//! registry on demand, so there are no reference cycles and erasing an id is
//! always safe.  The focus arbiter reads sessions through
//! [`SessionRegistry::with_sessions`] and never keeps them.
//!
//! # Events
//!
//! Lifecycle changes the focus arbiter must react to are published on
//! [`SessionRegistry::lifecycle`] *after* the registry lock has been released.
//! Subscribers are expected to post work to their own queue rather than act
//! inline.
//!
//! # Dirty tracking
//!
//! Every mutation marks a [`DirtyTracker`]; one debounced flush later the
//! current [`WindowInfoSnapshot`] is delivered to [`SessionRegistry::window_info`]
//! listeners.
//!
//! # Recovery
//!
//! A session created with `recoverable = true` whose client dies is parked as
//! pending recovery instead of being destroyed.  Its rect, window mode,
//! requested orientation and last state are persisted, and
//! [`SessionRegistry::recover`] brings it back from that bundle.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use wms_core::domain::hot_area::{compute_hot_areas, HotAreas};
use wms_core::runtime::peer::RecipientId;
use wms_core::{
    ForceHideState, PeerHandle, Rect, ScreenId, SessionEntity, SessionId, SessionInfo,
    SessionProperty, SessionState, Subject, TaskQueue, WindowType, WsError,
};

use super::dirty_tracker::{DirtyReason, DirtyTracker};
use super::session_persistence::SessionStateStore;

/// Looks up the virtual pixel ratio of a display.
pub type DensityProvider = Box<dyn Fn(ScreenId) -> Option<f32> + Send + Sync>;

/// Published after the registry lock is released.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLifecycleEvent {
    Foreground(SessionId),
    Background(SessionId),
    /// The session left the live map: destroyed, or parked for recovery.
    /// Carries the last snapshot since the id no longer resolves.
    Destroyed(SessionEntity),
    /// The session became invisible, unfocusable or force-hidden.
    FocusEligibilityLost(SessionId),
}

/// What input routing needs to know about one visible window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: SessionId,
    pub display_id: ScreenId,
    pub window_type: WindowType,
    pub rect: Rect,
    pub z_order: u32,
    pub touchable: bool,
    pub focused: bool,
    pub hot_areas: HotAreas,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowInfoSnapshot {
    /// Visible sessions, highest z-order first.
    pub windows: Vec<WindowInfo>,
    /// Parent id to its dialogs and modal sub-windows.
    pub dialogs: BTreeMap<SessionId, Vec<SessionId>>,
}

#[derive(Serialize)]
struct SessionDump<'a> {
    sessions: Vec<&'a SessionEntity>,
    pending_recovery: Vec<SessionId>,
}

struct Registration {
    peer: PeerHandle,
    recipient: RecipientId,
}

struct RegistryState {
    sessions: BTreeMap<SessionId, SessionEntity>,
    pending_recovery: BTreeMap<SessionId, SessionEntity>,
    registrations: HashMap<SessionId, Registration>,
    next_id: i32,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            pending_recovery: BTreeMap::new(),
            registrations: HashMap::new(),
            next_id: 1,
        }
    }
}

impl RegistryState {
    fn session_mut(&mut self, id: SessionId) -> Result<&mut SessionEntity, WsError> {
        self.sessions.get_mut(&id).ok_or(WsError::InvalidSession(id))
    }

    fn id_in_use(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id) || self.pending_recovery.contains_key(&id)
    }

    fn allocate_id(&mut self, requested: Option<SessionId>) -> Result<SessionId, WsError> {
        if let Some(id) = requested.filter(|id| id.is_valid()) {
            if self.id_in_use(id) {
                return Err(WsError::InvalidParam(format!("persistent id {id} is in use")));
            }
            self.next_id = self.next_id.max(id.0.saturating_add(1));
            return Ok(id);
        }
        while self.id_in_use(SessionId(self.next_id)) || self.next_id == SessionId::INVALID.0 {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    /// Adds `child` to its parent's dialog or sub-session list.
    fn attach(&mut self, child: SessionId) {
        let Some((parent_id, dialog_like)) = self
            .sessions
            .get(&child)
            .and_then(|c| Some((c.parent_id?, c.is_dialog_like())))
        else {
            return;
        };
        if let Some(parent) = self.sessions.get_mut(&parent_id) {
            let list = if dialog_like {
                &mut parent.dialogs
            } else {
                &mut parent.sub_sessions
            };
            if !list.contains(&child) {
                list.push(child);
            }
        }
    }

    /// Removes `child` from its parent's lists.
    fn detach(&mut self, child: SessionId) {
        let Some(parent_id) = self.sessions.get(&child).and_then(|c| c.parent_id) else {
            return;
        };
        if let Some(parent) = self.sessions.get_mut(&parent_id) {
            parent.dialogs.retain(|d| *d != child);
            parent.sub_sessions.retain(|s| *s != child);
        }
    }

    /// Detaches `id` from every index and removes it from the live map.
    fn erase(&mut self, id: SessionId) -> Option<SessionEntity> {
        self.detach(id);
        for session in self.sessions.values_mut() {
            if session.parent_id == Some(id) {
                session.parent_id = None;
            }
        }
        self.sessions.remove(&id)
    }
}

fn focus_eligible(session: &SessionEntity) -> bool {
    session.visible && session.focusable && session.force_hide == ForceHideState::NotHidden
}

fn dirty_reason(property: &SessionProperty) -> DirtyReason {
    match property {
        SessionProperty::Rect(_) | SessionProperty::TouchHotAreas(_) => DirtyReason::Geometry,
        SessionProperty::Visible(_) | SessionProperty::ForceHide(_) => DirtyReason::Visibility,
        _ => DirtyReason::Property,
    }
}

fn persisted_field(property: &SessionProperty) -> bool {
    matches!(
        property,
        SessionProperty::Rect(_)
            | SessionProperty::WindowMode(_)
            | SessionProperty::RequestedOrientation(_)
    )
}

pub struct SessionRegistry {
    state: ReentrantMutex<RefCell<RegistryState>>,
    persistence: SessionStateStore,
    dirty: DirtyTracker,
    density: parking_lot::Mutex<Option<DensityProvider>>,
    lifecycle: Subject<SessionLifecycleEvent>,
    window_info: Subject<WindowInfoSnapshot>,
    weak_self: Weak<SessionRegistry>,
}

impl SessionRegistry {
    /// `queue` is the session subsystem queue; debounced flushes run there
    /// `flush_window` after the first mark.
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        persistence: SessionStateStore,
        flush_window: Duration,
    ) -> Arc<Self> {
        let registry = Arc::new_cyclic(|weak: &Weak<SessionRegistry>| Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            persistence,
            dirty: DirtyTracker::new(queue, flush_window),
            density: parking_lot::Mutex::new(None),
            lifecycle: Subject::new(),
            window_info: Subject::new(),
            weak_self: weak.clone(),
        });
        let weak = Arc::downgrade(&registry);
        registry.dirty.set_flush_callback(Arc::new(move |reasons: &[DirtyReason]| {
            if let Some(registry) = weak.upgrade() {
                debug!("flushing window info ({reasons:?})");
                let snapshot = registry.window_info_snapshot();
                registry.window_info.notify(&snapshot);
            }
        }));
        registry
    }

    pub fn lifecycle(&self) -> &Subject<SessionLifecycleEvent> {
        &self.lifecycle
    }

    pub fn window_info(&self) -> &Subject<WindowInfoSnapshot> {
        &self.window_info
    }

    /// Hot areas are scaled by the density this returns for a session's
    /// display.  Without a provider the default density applies.
    pub fn set_density_provider(&self, provider: DensityProvider) {
        *self.density.lock() = Some(provider);
    }

    pub fn mark_dirty(&self, reason: DirtyReason) {
        self.dirty.mark_dirty(reason);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    fn publish(&self, events: Vec<SessionLifecycleEvent>) {
        for event in &events {
            self.lifecycle.notify(event);
        }
    }

    fn persist(&self, session: &SessionEntity) {
        if !session.recoverable {
            return;
        }
        if let Err(e) = self.persistence.save_bundle(session) {
            warn!("could not persist session {}: {e}", session.id);
        }
    }

    fn watch_owner(&self, id: SessionId, peer: &PeerHandle) -> Result<Registration, WsError> {
        let weak = self.weak_self.clone();
        let recipient = peer
            .add_death_recipient(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.on_session_died(id);
                }
            })
            .ok_or_else(|| {
                debug!("owner {} of session {id} is already dead", peer.name());
                WsError::InvalidOperation
            })?;
        Ok(Registration {
            peer: peer.clone(),
            recipient,
        })
    }

    fn unwatch_owner(state: &mut RegistryState, id: SessionId) {
        if let Some(reg) = state.registrations.remove(&id) {
            reg.peer.remove_death_recipient(reg.recipient);
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Allocates a persistent id (or reuses `info.persistent_id`), builds the
    /// session in `Created` state and links it to its parent.  When `owner` is
    /// given, the owner's death routes to [`on_session_died`](Self::on_session_died).
    ///
    /// # Errors
    ///
    /// - [`WsError::InvalidParam`] if the requested persistent id is taken, or
    ///   a sub-window or dialog names no parent.
    /// - [`WsError::InvalidSession`] if the named parent does not exist.
    /// - [`WsError::InvalidOperation`] if `owner` is already dead.
    pub fn create_session(
        &self,
        info: SessionInfo,
        owner: Option<&PeerHandle>,
    ) -> Result<SessionId, WsError> {
        let guard = self.state.lock();
        let id = {
            let mut state = guard.borrow_mut();
            match info.parent_id {
                Some(parent) if !state.sessions.contains_key(&parent) => {
                    return Err(WsError::InvalidSession(parent));
                }
                None if matches!(info.window_type, WindowType::AppSubWindow | WindowType::Dialog) => {
                    return Err(WsError::InvalidParam(format!(
                        "{:?} {} needs a parent",
                        info.window_type, info.name
                    )));
                }
                _ => {}
            }
            state.allocate_id(info.persistent_id)?
        };

        let registration = owner.map(|peer| self.watch_owner(id, peer)).transpose()?;

        let snapshot = {
            let mut state = guard.borrow_mut();
            let mut session = SessionEntity::from_info(id, &info);
            session.connect()?;
            session.owner = owner.map(PeerHandle::id);
            state.sessions.insert(id, session);
            state.attach(id);
            if let Some(reg) = registration {
                state.registrations.insert(id, reg);
            }
            state.sessions.get(&id).cloned()
        };
        if let Some(session) = &snapshot {
            self.persist(session);
        }
        info!("session {id} ({}) created on display {}", info.name, info.display_id);
        self.dirty.mark_dirty(DirtyReason::SessionAdded);
        Ok(id)
    }

    /// Destroys a live session, or discards one pending recovery.
    ///
    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id.
    pub fn destroy_session(&self, id: SessionId) -> Result<(), WsError> {
        let events = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            if state.pending_recovery.remove(&id).is_some() {
                drop(state);
                if let Err(e) = self.persistence.clear(id) {
                    warn!("could not clear persisted state of session {id}: {e}");
                }
                info!("session {id} discarded while pending recovery");
                return Ok(());
            }
            let mut session = state.erase(id).ok_or(WsError::InvalidSession(id))?;
            Self::unwatch_owner(&mut state, id);
            drop(state);
            // Destroying an already destroyed snapshot cannot happen: it was live.
            let _ = session.destroy();
            if let Err(e) = self.persistence.clear(id) {
                warn!("could not clear persisted state of session {id}: {e}");
            }
            info!("session {id} destroyed");
            vec![SessionLifecycleEvent::Destroyed(session)]
        };
        self.dirty.mark_dirty(DirtyReason::SessionRemoved);
        self.publish(events);
        Ok(())
    }

    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id, otherwise whatever the
    /// state machine says.
    pub fn foreground(&self, id: SessionId) -> Result<(), WsError> {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let session = state.session_mut(id)?;
            session.foreground()?;
            let snapshot = session.clone();
            drop(state);
            self.persist(&snapshot);
        }
        debug!("session {id} -> foreground");
        self.dirty.mark_dirty(DirtyReason::State);
        self.publish(vec![SessionLifecycleEvent::Foreground(id)]);
        Ok(())
    }

    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id, otherwise whatever the
    /// state machine says.
    pub fn background(&self, id: SessionId) -> Result<(), WsError> {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let session = state.session_mut(id)?;
            session.background()?;
            let snapshot = session.clone();
            drop(state);
            self.persist(&snapshot);
        }
        debug!("session {id} -> background");
        self.dirty.mark_dirty(DirtyReason::State);
        self.publish(vec![SessionLifecycleEvent::Background(id)]);
        Ok(())
    }

    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id, otherwise whatever the
    /// state machine says.
    pub fn set_active(&self, id: SessionId, active: bool) -> Result<(), WsError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.session_mut(id)?.set_active(active)
    }

    /// Sets the focused flag.  Only the focus arbiter calls this.  Gaining
    /// focus also activates a foreground session; losing it deactivates.
    ///
    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id.
    pub fn set_focused(&self, id: SessionId, focused: bool) -> Result<(), WsError> {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let session = state.session_mut(id)?;
            session.is_focused = focused;
            match session.set_active(focused) {
                Ok(()) | Err(WsError::DoNothing) => {}
                Err(e) => debug!("session {id} focus={focused} without activation: {e}"),
            }
        }
        self.dirty.mark_dirty(DirtyReason::Focus);
        Ok(())
    }

    /// Applies one property update.  Every update marks the registry dirty;
    /// losing focus eligibility publishes [`SessionLifecycleEvent::FocusEligibilityLost`].
    ///
    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id.
    pub fn update_property(&self, id: SessionId, property: SessionProperty) -> Result<(), WsError> {
        let reason = dirty_reason(&property);
        let persist = persisted_field(&property);
        let events = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let session = state.session_mut(id)?;
            let was_eligible = focus_eligible(session);
            let was_dialog_like = session.is_dialog_like();
            let changed = session.apply_property(property);
            let lost = was_eligible && !focus_eligible(session);
            let relink = session.is_dialog_like() != was_dialog_like;
            let snapshot = session.clone();
            if relink {
                state.detach(id);
                state.attach(id);
            }
            drop(state);
            if changed && persist {
                self.persist(&snapshot);
            }
            if lost {
                debug!("session {id} lost focus eligibility");
                vec![SessionLifecycleEvent::FocusEligibilityLost(id)]
            } else {
                Vec::new()
            }
        };
        self.dirty.mark_dirty(reason);
        self.publish(events);
        Ok(())
    }

    /// The owner of `id` died.  A recoverable session is parked with its
    /// state persisted; any other session is destroyed.
    pub fn on_session_died(&self, id: SessionId) {
        let parked = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let recoverable = match state.sessions.get(&id) {
                Some(session) => session.recoverable,
                None => return,
            };
            if recoverable {
                state.registrations.remove(&id);
                let parked = state.erase(id);
                if let Some(session) = &parked {
                    state.pending_recovery.insert(id, session.clone());
                }
                parked
            } else {
                None
            }
        };
        match parked {
            Some(session) => {
                if let Err(e) = self.persistence.save_bundle(&session) {
                    warn!("could not persist session {id} for recovery: {e}");
                }
                info!("session {id} died; pending recovery");
                self.dirty.mark_dirty(DirtyReason::SessionRemoved);
                self.publish(vec![SessionLifecycleEvent::Destroyed(session)]);
            }
            None => {
                info!("session {id} died");
                if let Err(e) = self.destroy_session(id) {
                    debug!("session {id} already gone: {e}");
                }
            }
        }
    }

    /// Brings a pending-recovery session back from its persisted bundle.
    /// Returns to `Foreground` if it was foreground or active, else `Created`.
    ///
    /// # Errors
    ///
    /// - [`WsError::DoNothing`] if the session is live.
    /// - [`WsError::InvalidSession`] if it is neither live nor pending.
    /// - [`WsError::InvalidOperation`] if `owner` is already dead.
    pub fn recover(&self, id: SessionId, owner: Option<&PeerHandle>) -> Result<(), WsError> {
        let guard = self.state.lock();
        let mut session = {
            let state = guard.borrow();
            if state.sessions.contains_key(&id) {
                return Err(WsError::DoNothing);
            }
            state
                .pending_recovery
                .get(&id)
                .cloned()
                .ok_or(WsError::InvalidSession(id))?
        };
        match self.persistence.load_bundle(id) {
            Some(bundle) => {
                session.rect = bundle.rect;
                session.window_mode = bundle.window_mode;
                session.requested_orientation = bundle.requested_orientation;
                session.state = bundle.last_state;
            }
            None => warn!("no persisted bundle for session {id}; recovering from memory"),
        }
        let was_foreground = session.is_foreground();
        session.state = SessionState::Initial;
        session.is_focused = false;
        session.connect()?;
        if was_foreground {
            session.foreground()?;
        }
        // Only watch the owner once the transitions have succeeded.
        let registration = owner.map(|peer| self.watch_owner(id, peer)).transpose()?;
        session.owner = owner.map(PeerHandle::id);
        let snapshot = session.clone();
        {
            let mut state = guard.borrow_mut();
            state.pending_recovery.remove(&id);
            state.sessions.insert(id, session);
            state.attach(id);
            if let Some(reg) = registration {
                state.registrations.insert(id, reg);
            }
        }
        drop(guard);
        self.persist(&snapshot);
        info!("session {id} recovered ({:?})", snapshot.state);
        self.dirty.mark_dirty(DirtyReason::SessionAdded);
        if was_foreground {
            self.publish(vec![SessionLifecycleEvent::Foreground(id)]);
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn session(&self, id: SessionId) -> Option<SessionEntity> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.sessions.get(&id).cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.sessions.contains_key(&id)
    }

    pub fn is_pending_recovery(&self, id: SessionId) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.pending_recovery.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over the live sessions under the registry lock.  `f` must not
    /// call back into the registry.
    pub fn with_sessions<R>(&self, f: impl FnOnce(&BTreeMap<SessionId, SessionEntity>) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state.sessions)
    }

    /// Visible sessions in descending z-order with their hot areas, plus the
    /// dialog map.  Clears the dirty flag.
    pub fn window_info_snapshot(&self) -> WindowInfoSnapshot {
        let density = self.density.lock();
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut visible: Vec<&SessionEntity> =
            state.sessions.values().filter(|s| s.visible).collect();
        visible.sort_by(|a, b| b.z_order.cmp(&a.z_order).then(a.id.cmp(&b.id)));
        let windows = visible
            .into_iter()
            .map(|s| WindowInfo {
                id: s.id,
                display_id: s.display_id,
                window_type: s.window_type,
                rect: s.rect,
                z_order: s.z_order,
                touchable: s.touchable,
                focused: s.is_focused,
                hot_areas: compute_hot_areas(s, density.as_ref().and_then(|d| d(s.display_id))),
            })
            .collect();
        let dialogs = state
            .sessions
            .values()
            .filter(|s| !s.dialogs.is_empty())
            .map(|s| (s.id, s.dialogs.clone()))
            .collect();
        self.dirty.clear();
        WindowInfoSnapshot { windows, dialogs }
    }

    /// JSON dump of every session, for diagnostics.
    pub fn dump_all(&self) -> String {
        let guard = self.state.lock();
        let state = guard.borrow();
        let dump = SessionDump {
            sessions: state.sessions.values().collect(),
            pending_recovery: state.pending_recovery.keys().copied().collect(),
        };
        serde_json::to_string_pretty(&dump).unwrap_or_else(|e| {
            warn!("session dump failed: {e}");
            String::new()
        })
    }

    /// JSON dump of one session.
    ///
    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id.
    pub fn dump_session(&self, id: SessionId) -> Result<String, WsError> {
        let session = self.session(id).ok_or(WsError::InvalidSession(id))?;
        serde_json::to_string_pretty(&session).map_err(|e| WsError::InvalidParam(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
