//! ScreenRegistry: sole owner of screen identities, screens and screen groups.
//!
//! # Two id spaces (for beginners)
//!
//! The rendering backend names its screens with its own ids
//! ([`BackendScreenId`]).  Clients never see those; they see logical
//! [`ScreenId`]s issued here.  The [`ScreenIdentityMap`] keeps the two in a
//! strict bijection, and every lookup from the outside goes through it.
//!
//! # Locking
//!
//! All state sits behind one re-entrant lock.  Listener callbacks run while
//! the lock is held (so events reach listeners in mutation order) but never
//! while the inner `RefCell` is borrowed, which lets a listener call straight
//! back into the registry from its callback.
//!
//! # Groups
//!
//! At most one mirror group and one expand group exist at a time.  Each is
//! created on first use and dissolved as soon as its last member leaves.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wms_core::domain::geometry::Point;
use wms_core::protocol::events::{
    ScreenChange, ScreenChangeEvent, ScreenConnectionEvent, ScreenEvent, ScreenGroupChange,
    ScreenGroupChangeEvent,
};
use wms_core::runtime::subject::{Listener, ListenerId, Subject};
use wms_core::{
    BackendScreenId, CombinationMode, DisplayInfo, DisplayMode, DmError, Orientation, Rotation,
    ScreenEntity, ScreenGroupEntity, ScreenId, ScreenIdentityMap, ScreenInfo, ScreenType,
    VirtualScreenOption,
};

use crate::infrastructure::backend::{BackendError, RenderBackend};

/// Refresh rate given to virtual screens; they have no panel to ask.
const VIRTUAL_REFRESH_RATE: u32 = 60;

fn backend_failure(err: BackendError) -> DmError {
    warn!("backend call failed: {err}");
    DmError::Backend(err.to_string())
}

#[derive(Default)]
struct ScreenState {
    identities: ScreenIdentityMap,
    screens: BTreeMap<ScreenId, ScreenEntity>,
    groups: BTreeMap<ScreenId, ScreenGroupEntity>,
    virtual_owners: HashMap<ScreenId, Uuid>,
}

impl ScreenState {
    fn screen_mut(&mut self, id: ScreenId) -> Result<&mut ScreenEntity, DmError> {
        self.screens.get_mut(&id).ok_or(DmError::ScreenNotFound(id))
    }

    fn width_of(&self, id: ScreenId) -> u32 {
        self.screens
            .get(&id)
            .map(|s| s.display_info().width)
            .unwrap_or(0)
    }

    /// The shared group for `mode`, created on first use.
    fn group_for(&mut self, mode: CombinationMode) -> ScreenId {
        if let Some(group) = self.groups.values().find(|g| g.combination == mode) {
            return group.id;
        }
        let id = self.identities.allocate_logical();
        self.groups.insert(id, ScreenGroupEntity::new(id, mode));
        debug!("screen group {id} ({mode:?}) created");
        id
    }

    /// Takes `screen_id` out of its group, dissolving the group if it empties.
    /// Returns the group it left.
    fn detach(&mut self, screen_id: ScreenId) -> Option<ScreenId> {
        let group_id = self.screens.get_mut(&screen_id)?.group_id.take()?;
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.remove_child(screen_id);
            if group.is_empty() {
                self.groups.remove(&group_id);
                debug!("screen group {group_id} dissolved");
            }
        }
        Some(group_id)
    }

    fn join(
        &mut self,
        source: ScreenId,
        targets: &[ScreenId],
        mode: CombinationMode,
    ) -> Result<Vec<ScreenGroupChange>, DmError> {
        let src = self
            .screens
            .get(&source)
            .ok_or(DmError::ScreenNotFound(source))?;
        if src.screen_type != ScreenType::Real {
            return Err(DmError::InvalidOperation(format!(
                "group source {source} is not a real screen"
            )));
        }
        if let Some(missing) = targets.iter().find(|t| !self.screens.contains_key(*t)) {
            return Err(DmError::ScreenNotFound(*missing));
        }

        let group_id = self.group_for(mode);
        let mut members = vec![source];
        for target in targets {
            if !members.contains(target) {
                members.push(*target);
            }
        }

        let mut changes = Vec::new();
        for id in members {
            let previous = self.screens.get(&id).and_then(|s| s.group_id);
            if previous == Some(group_id) {
                continue;
            }
            let event = if previous.is_some() {
                self.detach(id);
                ScreenGroupChangeEvent::ChangeGroup
            } else {
                ScreenGroupChangeEvent::AddToGroup
            };
            let offset = self
                .groups
                .get(&group_id)
                .map(|g| g.next_child_offset(|c| self.width_of(c)))
                .unwrap_or(Point::ORIGIN);
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.add_child(id, offset);
            }
            if let Some(screen) = self.screens.get_mut(&id) {
                screen.group_id = Some(group_id);
            }
            changes.push(ScreenGroupChange {
                screen_id: id,
                group_id,
                event,
            });
        }
        Ok(changes)
    }

    /// Removes a screen from every index.  Returns the group it was in.
    fn erase(&mut self, id: ScreenId) -> Option<ScreenId> {
        let group = self.detach(id);
        self.screens.remove(&id);
        self.identities.remove_logical(id);
        self.virtual_owners.remove(&id);
        group
    }
}

/// See the module documentation.
pub struct ScreenRegistry {
    backend: Arc<dyn RenderBackend>,
    state: ReentrantMutex<RefCell<ScreenState>>,
    connection_listeners: Subject<ScreenConnectionEvent>,
    change_listeners: Subject<ScreenChange>,
    group_listeners: Subject<ScreenGroupChange>,
}

impl ScreenRegistry {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            state: ReentrantMutex::new(RefCell::new(ScreenState::default())),
            connection_listeners: Subject::new(),
            change_listeners: Subject::new(),
            group_listeners: Subject::new(),
        }
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    /// Registers a connection listener and immediately replays a `Connected`
    /// event for every screen that is already connected.
    ///
    /// # Errors
    ///
    /// [`DmError::InvalidParam`] if this listener is already registered.
    pub fn register_connection_listener(
        &self,
        listener: Arc<dyn Listener<ScreenConnectionEvent>>,
    ) -> Result<ListenerId, DmError> {
        let guard = self.state.lock();
        let id = self
            .connection_listeners
            .subscribe(Arc::clone(&listener))
            .ok_or_else(|| DmError::InvalidParam("listener already registered".into()))?;
        let connected: Vec<ScreenInfo> = guard
            .borrow()
            .screens
            .values()
            .filter(|s| s.connected)
            .map(ScreenEntity::screen_info)
            .collect();
        for info in connected {
            listener.on_event(&ScreenConnectionEvent::Connected(info));
        }
        Ok(id)
    }

    pub fn unregister_connection_listener(
        &self,
        listener: &Arc<dyn Listener<ScreenConnectionEvent>>,
    ) -> bool {
        self.connection_listeners.unsubscribe_listener(listener)
    }

    pub fn change_listeners(&self) -> &Subject<ScreenChange> {
        &self.change_listeners
    }

    pub fn group_listeners(&self) -> &Subject<ScreenGroupChange> {
        &self.group_listeners
    }

    fn notify_change(&self, info: ScreenInfo, event: ScreenChangeEvent) {
        self.change_listeners.notify(&ScreenChange { info, event });
    }

    fn notify_groups(&self, changes: &[ScreenGroupChange]) {
        for change in changes {
            self.group_listeners.notify(change);
        }
    }

    // ── Identity and lookup ───────────────────────────────────────────────────

    /// Returns the logical id for `backend_id`, creating the screen on first
    /// sight.  Idempotent: a known backend id always yields the same logical id.
    ///
    /// # Errors
    ///
    /// [`DmError::Backend`] if the backend cannot describe the screen or
    /// reports no supported modes.
    pub fn get_or_create_screen(&self, backend_id: BackendScreenId) -> Result<ScreenId, DmError> {
        let guard = self.state.lock();
        if let Some(id) = guard.borrow().identities.to_logical(backend_id) {
            return Ok(id);
        }

        let described = self.backend.query_screen(backend_id).map_err(backend_failure)?;
        if described.modes.is_empty() {
            warn!("backend screen {backend_id} reports no modes");
            return Err(DmError::Backend(format!(
                "backend screen {backend_id} has no supported modes"
            )));
        }

        let mut state = guard.borrow_mut();
        let (id, _) = state.identities.get_or_allocate(backend_id);
        let screen = ScreenEntity::new(
            id,
            backend_id,
            described.name,
            ScreenType::Real,
            described.modes,
            described.density,
        );
        state.screens.insert(id, screen);
        info!("screen {id} created for backend screen {backend_id}");
        Ok(id)
    }

    pub fn to_backend(&self, id: ScreenId) -> Option<BackendScreenId> {
        self.state.lock().borrow().identities.to_backend(id)
    }

    pub fn to_logical(&self, backend_id: BackendScreenId) -> Option<ScreenId> {
        self.state.lock().borrow().identities.to_logical(backend_id)
    }

    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for an unknown id.
    pub fn screen_info(&self, id: ScreenId) -> Result<ScreenInfo, DmError> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .screens
            .get(&id)
            .map(ScreenEntity::screen_info)
            .ok_or(DmError::ScreenNotFound(id))
    }

    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for an unknown id.
    pub fn display_info(&self, id: ScreenId) -> Result<DisplayInfo, DmError> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .screens
            .get(&id)
            .map(ScreenEntity::display_info)
            .ok_or(DmError::ScreenNotFound(id))
    }

    pub fn all_screen_ids(&self) -> Vec<ScreenId> {
        self.state.lock().borrow().screens.keys().copied().collect()
    }

    pub fn all_screen_infos(&self) -> Vec<ScreenInfo> {
        self.state
            .lock()
            .borrow()
            .screens
            .values()
            .map(ScreenEntity::screen_info)
            .collect()
    }

    /// The lowest-numbered connected real screen.
    pub fn default_screen_id(&self) -> Option<ScreenId> {
        self.state
            .lock()
            .borrow()
            .screens
            .values()
            .find(|s| s.connected && s.screen_type == ScreenType::Real)
            .map(|s| s.id)
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().borrow().groups.len()
    }

    /// Members of group `group_id` with their offsets, in join order.
    pub fn group_members(&self, group_id: ScreenId) -> Vec<(ScreenId, Point)> {
        self.state
            .lock()
            .borrow()
            .groups
            .get(&group_id)
            .map(|g| g.children().iter().map(|c| (c.screen_id, c.offset)).collect())
            .unwrap_or_default()
    }

    // ── Backend connection events ─────────────────────────────────────────────

    /// Applies a raw connection event from the backend.  Unknown event values
    /// are logged and ignored.
    pub fn on_screen_change(&self, backend_id: BackendScreenId, event: ScreenEvent) {
        match event {
            ScreenEvent::Connected => self.handle_connected(backend_id),
            ScreenEvent::Disconnected => self.handle_disconnected(backend_id),
            ScreenEvent::Unknown(value) => {
                warn!("unknown screen event {value} for backend screen {backend_id}; ignored");
            }
        }
    }

    fn handle_connected(&self, backend_id: BackendScreenId) {
        let guard = self.state.lock();
        let id = match self.get_or_create_screen(backend_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("cannot register backend screen {backend_id}: {e}");
                return;
            }
        };
        let info = {
            let mut state = guard.borrow_mut();
            match state.screens.get_mut(&id) {
                Some(screen) => {
                    screen.connected = true;
                    screen.screen_info()
                }
                None => return,
            }
        };
        self.connection_listeners
            .notify(&ScreenConnectionEvent::Connected(info));
    }

    fn handle_disconnected(&self, backend_id: BackendScreenId) {
        let guard = self.state.lock();
        let Some(id) = guard.borrow().identities.to_logical(backend_id) else {
            warn!("disconnect for unknown backend screen {backend_id}; ignored");
            return;
        };
        if let Some(screen) = guard.borrow_mut().screens.get_mut(&id) {
            screen.connected = false;
        }
        self.connection_listeners
            .notify(&ScreenConnectionEvent::Disconnected(id));

        let group = guard.borrow_mut().erase(id);
        if let Some(group_id) = group {
            self.notify_groups(&[ScreenGroupChange {
                screen_id: id,
                group_id,
                event: ScreenGroupChangeEvent::RemoveFromGroup,
            }]);
        }
        info!("screen {id} disconnected and erased");
    }

    // ── Orientation and rotation ──────────────────────────────────────────────

    /// Pins or releases the screen's orientation.
    ///
    /// A window asking for `Unspecified` restores the screen's last requested
    /// orientation, always animated.  Any other request is stored as the new
    /// requested orientation.  Nothing happens when the resulting orientation
    /// is already applied.
    ///
    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for an unknown id, [`DmError::Backend`] if
    /// the backend rejects the rotation.
    pub fn set_orientation(
        &self,
        id: ScreenId,
        orientation: Orientation,
        from_window: bool,
        with_animation: bool,
    ) -> Result<(), DmError> {
        let guard = self.state.lock();
        let changed = {
            let mut state = guard.borrow_mut();
            let screen = state.screen_mut(id)?;
            let (target, animate) = if from_window && orientation == Orientation::Unspecified {
                (screen.requested_orientation, true)
            } else {
                screen.requested_orientation = orientation;
                (orientation, with_animation)
            };
            if target == screen.orientation {
                None
            } else {
                let rotation = screen
                    .rotation_mapping()
                    .orientation_to_rotation(target)
                    .unwrap_or(screen.rotation);
                self.backend
                    .set_rotation(screen.backend_id, rotation, animate)
                    .map_err(backend_failure)?;
                screen.orientation = target;
                screen.rotation = rotation;
                debug!("screen {id} orientation {target:?} rotation {rotation:?}");
                Some(screen.screen_info())
            }
        };
        if let Some(info) = changed {
            self.notify_change(info, ScreenChangeEvent::UpdateOrientation);
        }
        Ok(())
    }

    /// Applies a sensor-derived rotation if the screen follows the sensor.
    /// Returns whether the rotation changed.
    ///
    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] or [`DmError::Backend`].
    pub fn sensor_rotation_change(&self, id: ScreenId, rotation: Rotation) -> Result<bool, DmError> {
        let guard = self.state.lock();
        let changed = {
            let mut state = guard.borrow_mut();
            let screen = state.screen_mut(id)?;
            if !screen.follows_sensor() || screen.rotation == rotation {
                None
            } else {
                self.backend
                    .set_rotation(screen.backend_id, rotation, true)
                    .map_err(backend_failure)?;
                screen.rotation = rotation;
                Some(screen.screen_info())
            }
        };
        match changed {
            Some(info) => {
                self.notify_change(info, ScreenChangeEvent::UpdateRotation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for an unknown id.
    pub fn set_screen_rotation_locked(&self, id: ScreenId, locked: bool) -> Result<(), DmError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.screen_mut(id)?.rotation_locked = locked;
        Ok(())
    }

    // ── Modes and pixel ratio ─────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`DmError::InvalidParam`] for an index outside the supported modes,
    /// plus the usual not-found and backend failures.
    pub fn set_screen_active_mode(&self, id: ScreenId, mode_idx: usize) -> Result<(), DmError> {
        let guard = self.state.lock();
        let changed = {
            let mut state = guard.borrow_mut();
            let screen = state.screen_mut(id)?;
            if mode_idx >= screen.modes.len() {
                return Err(DmError::InvalidParam(format!(
                    "mode {mode_idx} out of range ({} modes)",
                    screen.modes.len()
                )));
            }
            if mode_idx == screen.active_mode_idx {
                None
            } else {
                self.backend
                    .set_active_mode(screen.backend_id, mode_idx)
                    .map_err(backend_failure)?;
                screen.set_active_mode(mode_idx);
                Some(screen.screen_info())
            }
        };
        if let Some(info) = changed {
            self.notify_change(info, ScreenChangeEvent::ChangeMode);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`DmError::InvalidParam`] for a negative or non-finite ratio.
    pub fn set_virtual_pixel_ratio(&self, id: ScreenId, ratio: f32) -> Result<(), DmError> {
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(DmError::InvalidParam(format!("pixel ratio {ratio}")));
        }
        let guard = self.state.lock();
        let changed = {
            let mut state = guard.borrow_mut();
            let screen = state.screen_mut(id)?;
            if (screen.virtual_pixel_ratio - ratio).abs() < f32::EPSILON {
                None
            } else {
                screen.virtual_pixel_ratio = ratio;
                Some(screen.screen_info())
            }
        };
        if let Some(info) = changed {
            self.notify_change(info, ScreenChangeEvent::VirtualPixelRatioChanged);
        }
        Ok(())
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Puts `source` and `targets` into the shared mirror group.
    ///
    /// # Errors
    ///
    /// [`DmError::InvalidOperation`] unless `source` is a real screen,
    /// [`DmError::ScreenNotFound`] for any unknown id.  Nothing changes on error.
    pub fn set_mirror(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.join_group(source, targets, CombinationMode::Mirror)
    }

    /// Puts `source` and `targets` side by side in the shared expand group.
    ///
    /// # Errors
    ///
    /// Same as [`set_mirror`](Self::set_mirror).
    pub fn make_expand(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.join_group(source, targets, CombinationMode::Expand)
    }

    fn join_group(
        &self,
        source: ScreenId,
        targets: &[ScreenId],
        mode: CombinationMode,
    ) -> Result<(), DmError> {
        let guard = self.state.lock();
        let changes = guard.borrow_mut().join(source, targets, mode)?;
        self.notify_groups(&changes);
        Ok(())
    }

    /// Takes each screen out of its group.  Ungrouped screens are skipped.
    ///
    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for any unknown id; nothing changes then.
    pub fn remove_from_group(&self, screens: &[ScreenId]) -> Result<(), DmError> {
        let guard = self.state.lock();
        let changes = {
            let mut state = guard.borrow_mut();
            if let Some(missing) = screens.iter().find(|s| !state.screens.contains_key(*s)) {
                return Err(DmError::ScreenNotFound(*missing));
            }
            screens
                .iter()
                .filter_map(|&screen_id| {
                    state.detach(screen_id).map(|group_id| ScreenGroupChange {
                        screen_id,
                        group_id,
                        event: ScreenGroupChangeEvent::RemoveFromGroup,
                    })
                })
                .collect::<Vec<_>>()
        };
        self.notify_groups(&changes);
        Ok(())
    }

    // ── Virtual screens ───────────────────────────────────────────────────────

    /// Creates a virtual screen owned by client `owner`.
    ///
    /// # Errors
    ///
    /// [`DmError::InvalidParam`] for a zero size, [`DmError::Backend`] if the
    /// backend refuses.
    pub fn create_virtual_screen(
        &self,
        option: VirtualScreenOption,
        owner: Uuid,
    ) -> Result<ScreenId, DmError> {
        if option.width == 0 || option.height == 0 {
            return Err(DmError::InvalidParam(format!(
                "virtual screen size {}x{}",
                option.width, option.height
            )));
        }
        let guard = self.state.lock();
        let backend_id = self
            .backend
            .create_virtual_screen(&option)
            .map_err(backend_failure)?;
        let info = {
            let mut state = guard.borrow_mut();
            let (id, _) = state.identities.get_or_allocate(backend_id);
            let density = if option.density > 0.0 { option.density } else { 1.0 };
            let mut screen = ScreenEntity::new(
                id,
                backend_id,
                option.name,
                ScreenType::Virtual,
                vec![DisplayMode::new(option.width, option.height, VIRTUAL_REFRESH_RATE)],
                density,
            );
            screen.connected = true;
            let info = screen.screen_info();
            state.screens.insert(id, screen);
            state.virtual_owners.insert(id, owner);
            info
        };
        info!("virtual screen {} ({}) created for client {owner}", info.id, info.name);
        let id = info.id;
        self.connection_listeners
            .notify(&ScreenConnectionEvent::Connected(info));
        Ok(id)
    }

    /// # Errors
    ///
    /// [`DmError::ScreenNotFound`] for an unknown id,
    /// [`DmError::InvalidOperation`] for a real screen.
    pub fn destroy_virtual_screen(&self, id: ScreenId) -> Result<(), DmError> {
        let guard = self.state.lock();
        let backend_id = {
            let state = guard.borrow();
            let screen = state.screens.get(&id).ok_or(DmError::ScreenNotFound(id))?;
            if screen.screen_type != ScreenType::Virtual {
                return Err(DmError::InvalidOperation(format!(
                    "screen {id} is not a virtual screen"
                )));
            }
            screen.backend_id
        };
        if let Err(e) = self.backend.remove_virtual_screen(backend_id) {
            // The entity goes regardless; the backend may already have dropped it.
            warn!("backend could not remove virtual screen {id}: {e}");
        }
        let group = guard.borrow_mut().erase(id);
        self.connection_listeners
            .notify(&ScreenConnectionEvent::Disconnected(id));
        if let Some(group_id) = group {
            self.notify_groups(&[ScreenGroupChange {
                screen_id: id,
                group_id,
                event: ScreenGroupChangeEvent::RemoveFromGroup,
            }]);
        }
        info!("virtual screen {id} destroyed");
        Ok(())
    }

    /// Destroys every virtual screen `client` created.  Returns how many went.
    pub fn on_client_died(&self, client: Uuid) -> usize {
        let owned: Vec<ScreenId> = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state
                .virtual_owners
                .iter()
                .filter(|(_, owner)| **owner == client)
                .map(|(id, _)| *id)
                .collect()
        };
        let destroyed = owned
            .into_iter()
            .filter(|id| self.destroy_virtual_screen(*id).is_ok())
            .count();
        if destroyed > 0 {
            info!("client {client} died; destroyed {destroyed} virtual screen(s)");
        }
        destroyed
    }

    /// Virtual screens currently owned by `client`.
    pub fn virtual_screens_of(&self, client: Uuid) -> Vec<ScreenId> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut ids: Vec<ScreenId> = state
            .virtual_owners
            .iter()
            .filter(|(_, owner)| **owner == client)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
