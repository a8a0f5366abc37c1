//! In-memory rendering backend.
//!
//! Holds a table of screens with their modes, active mode and rotation, and
//! reports connect/disconnect changes over a tokio channel, the same way a
//! compositor connection would.  The server uses it when no compositor is
//! attached; tests use it to plug and unplug screens.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use wms_core::protocol::events::ScreenEvent;
use wms_core::{BackendScreenId, DisplayMode, Rotation, VirtualScreenOption};

use super::{BackendError, BackendScreen, BackendScreenEvent, RenderBackend};

/// Backend ids are issued from here upwards so they never look like logical ids.
const FIRST_BACKEND_ID: u64 = 1000;

#[derive(Debug, Clone)]
struct HeadlessScreen {
    info: BackendScreen,
    active_mode: usize,
    rotation: Rotation,
    animated: bool,
    is_virtual: bool,
}

#[derive(Debug)]
struct HeadlessState {
    screens: BTreeMap<BackendScreenId, HeadlessScreen>,
    next_id: u64,
    available: bool,
    subscriber: Option<UnboundedSender<BackendScreenEvent>>,
}

/// A [`RenderBackend`] with no compositor behind it.
#[derive(Debug)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                screens: BTreeMap::new(),
                next_id: FIRST_BACKEND_ID,
                available: true,
                subscriber: None,
            }),
        }
    }

    /// Plugs in a physical screen and reports it as connected.
    pub fn connect_screen(
        &self,
        name: impl Into<String>,
        modes: Vec<DisplayMode>,
        density: f32,
    ) -> BackendScreenId {
        let mut state = self.state.lock();
        let id = BackendScreenId(state.next_id);
        state.next_id += 1;
        state.screens.insert(
            id,
            HeadlessScreen {
                info: BackendScreen {
                    name: name.into(),
                    modes,
                    density,
                },
                active_mode: 0,
                rotation: Rotation::Deg0,
                animated: false,
                is_virtual: false,
            },
        );
        debug!("headless backend: screen {id} connected");
        Self::emit(&mut state, id, ScreenEvent::Connected);
        id
    }

    /// Unplugs a physical screen.  Returns `false` if it is unknown.
    pub fn disconnect_screen(&self, id: BackendScreenId) -> bool {
        let mut state = self.state.lock();
        if state.screens.remove(&id).is_none() {
            return false;
        }
        debug!("headless backend: screen {id} disconnected");
        Self::emit(&mut state, id, ScreenEvent::Disconnected);
        true
    }

    /// Sends an arbitrary raw event value, as a misbehaving compositor might.
    pub fn emit_raw(&self, id: BackendScreenId, event: ScreenEvent) {
        Self::emit(&mut self.state.lock(), id, event);
    }

    /// Returns the event stream.  Every screen already connected is replayed
    /// first.  Only the most recent subscriber receives events.
    pub fn subscribe(&self) -> UnboundedReceiver<BackendScreenEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        for (id, screen) in &state.screens {
            if !screen.is_virtual {
                let _ = tx.send(BackendScreenEvent {
                    backend_id: *id,
                    event: ScreenEvent::Connected,
                });
            }
        }
        state.subscriber = Some(tx);
        rx
    }

    /// Makes every call fail with [`BackendError::Unavailable`] while `false`.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Current rotation and whether it was applied with an animation.
    pub fn rotation_of(&self, id: BackendScreenId) -> Option<(Rotation, bool)> {
        self.state
            .lock()
            .screens
            .get(&id)
            .map(|s| (s.rotation, s.animated))
    }

    pub fn active_mode_of(&self, id: BackendScreenId) -> Option<usize> {
        self.state.lock().screens.get(&id).map(|s| s.active_mode)
    }

    pub fn screen_count(&self) -> usize {
        self.state.lock().screens.len()
    }

    fn emit(state: &mut HeadlessState, id: BackendScreenId, event: ScreenEvent) {
        if let Some(tx) = &state.subscriber {
            if tx.send(BackendScreenEvent { backend_id: id, event }).is_err() {
                warn!("headless backend: event subscriber is gone");
                state.subscriber = None;
            }
        }
    }

    fn with_screen<R>(
        &self,
        id: BackendScreenId,
        f: impl FnOnce(&mut HeadlessScreen) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(BackendError::Unavailable);
        }
        let screen = state
            .screens
            .get_mut(&id)
            .ok_or(BackendError::UnknownScreen(id))?;
        f(screen)
    }
}

impl RenderBackend for HeadlessBackend {
    fn query_screen(&self, id: BackendScreenId) -> Result<BackendScreen, BackendError> {
        self.with_screen(id, |screen| Ok(screen.info.clone()))
    }

    fn set_active_mode(&self, id: BackendScreenId, mode_idx: usize) -> Result<(), BackendError> {
        self.with_screen(id, |screen| {
            if mode_idx >= screen.info.modes.len() {
                return Err(BackendError::ModeOutOfRange {
                    screen: id,
                    index: mode_idx,
                });
            }
            screen.active_mode = mode_idx;
            Ok(())
        })
    }

    fn set_rotation(
        &self,
        id: BackendScreenId,
        rotation: Rotation,
        animate: bool,
    ) -> Result<(), BackendError> {
        self.with_screen(id, |screen| {
            screen.rotation = rotation;
            screen.animated = animate;
            Ok(())
        })
    }

    fn create_virtual_screen(
        &self,
        option: &VirtualScreenOption,
    ) -> Result<BackendScreenId, BackendError> {
        if option.width == 0 || option.height == 0 {
            return Err(BackendError::VirtualScreenRejected(format!(
                "{}x{} is not a valid size",
                option.width, option.height
            )));
        }
        let mut state = self.state.lock();
        if !state.available {
            return Err(BackendError::Unavailable);
        }
        let id = BackendScreenId(state.next_id);
        state.next_id += 1;
        state.screens.insert(
            id,
            HeadlessScreen {
                info: BackendScreen {
                    name: option.name.clone(),
                    modes: vec![DisplayMode::new(option.width, option.height, 60)],
                    density: option.density,
                },
                active_mode: 0,
                rotation: Rotation::Deg0,
                animated: false,
                is_virtual: true,
            },
        );
        debug!("headless backend: virtual screen {id} ({}) created", option.name);
        Ok(id)
    }

    fn remove_virtual_screen(&self, id: BackendScreenId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(BackendError::Unavailable);
        }
        match state.screens.get(&id) {
            Some(screen) if screen.is_virtual => {
                state.screens.remove(&id);
                Ok(())
            }
            _ => Err(BackendError::UnknownScreen(id)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> Vec<DisplayMode> {
        vec![DisplayMode::new(1080, 2340, 60), DisplayMode::new(720, 1560, 90)]
    }

    #[test]
    fn test_connect_screen_emits_connected_event() {
        // Arrange
        let backend = HeadlessBackend::new();
        let mut rx = backend.subscribe();

        // Act
        let id = backend.connect_screen("panel", panel(), 3.0);

        // Assert
        let event = rx.try_recv().expect("event must be queued");
        assert_eq!(event.backend_id, id);
        assert_eq!(event.event, ScreenEvent::Connected);
    }

    #[test]
    fn test_subscribe_replays_connected_screens() {
        let backend = HeadlessBackend::new();
        let a = backend.connect_screen("a", panel(), 1.0);
        let b = backend.connect_screen("b", panel(), 1.0);

        let mut rx = backend.subscribe();

        assert_eq!(rx.try_recv().map(|e| e.backend_id).ok(), Some(a));
        assert_eq!(rx.try_recv().map(|e| e.backend_id).ok(), Some(b));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_active_mode_validates_index() {
        let backend = HeadlessBackend::new();
        let id = backend.connect_screen("panel", panel(), 3.0);

        assert_eq!(backend.set_active_mode(id, 1), Ok(()));
        assert_eq!(backend.active_mode_of(id), Some(1));
        assert_eq!(
            backend.set_active_mode(id, 5),
            Err(BackendError::ModeOutOfRange { screen: id, index: 5 })
        );
    }

    #[test]
    fn test_unavailable_backend_fails_every_call() {
        let backend = HeadlessBackend::new();
        let id = backend.connect_screen("panel", panel(), 3.0);
        backend.set_available(false);

        assert_eq!(backend.query_screen(id), Err(BackendError::Unavailable));
        assert_eq!(
            backend.set_rotation(id, Rotation::Deg90, false),
            Err(BackendError::Unavailable)
        );
    }

    #[test]
    fn test_virtual_screen_create_and_remove() {
        // Arrange
        let backend = HeadlessBackend::new();
        let option = VirtualScreenOption::new("vs1", 800, 600);

        // Act
        let id = backend.create_virtual_screen(&option).expect("create");

        // Assert
        let info = backend.query_screen(id).expect("query");
        assert_eq!(info.modes, vec![DisplayMode::new(800, 600, 60)]);
        assert_eq!(backend.remove_virtual_screen(id), Ok(()));
        assert_eq!(
            backend.remove_virtual_screen(id),
            Err(BackendError::UnknownScreen(id))
        );
    }

    #[test]
    fn test_virtual_screen_with_zero_size_is_rejected() {
        let backend = HeadlessBackend::new();
        let result = backend.create_virtual_screen(&VirtualScreenOption::new("bad", 0, 600));
        assert!(matches!(result, Err(BackendError::VirtualScreenRejected(_))));
    }

    #[test]
    fn test_physical_screen_cannot_be_removed_as_virtual() {
        let backend = HeadlessBackend::new();
        let id = backend.connect_screen("panel", panel(), 3.0);
        assert_eq!(
            backend.remove_virtual_screen(id),
            Err(BackendError::UnknownScreen(id))
        );
        assert_eq!(backend.screen_count(), 1);
    }
}
