//! Persisted per-session state used for recovery.
//!
//! Four fields survive a client crash (and a server restart when the store is
//! file-backed): geometry, window mode, requested orientation and the last
//! lifecycle state.  Each one lives under its own stable key:
//!
//! ```text
//! session.<id>.rect                   {"x":0,"y":0,"width":1080,"height":2340}
//! session.<id>.window_mode            fullscreen
//! session.<id>.requested_orientation  "Sensor"
//! session.<id>.last_state             foreground
//! ```
//!
//! A value that no longer parses is logged and treated as absent.

use std::sync::Arc;

use tracing::warn;
use wms_core::{Orientation, Rect, SessionEntity, SessionId, SessionState, WindowMode};

use crate::infrastructure::storage::kv_store::{KeyValueStore, StorageError};

const FIELD_RECT: &str = "rect";
const FIELD_WINDOW_MODE: &str = "window_mode";
const FIELD_REQUESTED_ORIENTATION: &str = "requested_orientation";
const FIELD_LAST_STATE: &str = "last_state";

/// Everything persisted for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBundle {
    pub rect: Rect,
    pub window_mode: WindowMode,
    pub requested_orientation: Orientation,
    pub last_state: SessionState,
}

impl SessionBundle {
    pub fn of(session: &SessionEntity) -> Self {
        Self {
            rect: session.rect,
            window_mode: session.window_mode,
            requested_orientation: session.requested_orientation,
            last_state: session.state,
        }
    }
}

pub struct SessionStateStore {
    store: Arc<dyn KeyValueStore>,
}

fn key(id: SessionId, field: &str) -> String {
    format!("session.{}.{field}", id.0)
}

fn prefix(id: SessionId) -> String {
    format!("session.{}.", id.0)
}

impl SessionStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, id: SessionId, field: &str) -> Option<T> {
        let raw = self.store.get(&key(id, field))?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("persisted {field} of session {id} is unreadable: {e}");
                None
            }
        }
    }

    fn set_json<T: serde::Serialize>(
        &self,
        id: SessionId,
        field: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        // Plain data types; serializing them cannot fail.
        let raw = serde_json::to_string(value).unwrap_or_default();
        self.store.set(&key(id, field), raw)
    }

    pub fn get_rect(&self, id: SessionId) -> Option<Rect> {
        self.get_json(id, FIELD_RECT)
    }

    /// # Errors
    ///
    /// Propagates the underlying [`StorageError`].
    pub fn set_rect(&self, id: SessionId, rect: Rect) -> Result<(), StorageError> {
        self.set_json(id, FIELD_RECT, &rect)
    }

    pub fn get_window_mode(&self, id: SessionId) -> Option<WindowMode> {
        let raw = self.store.get(&key(id, FIELD_WINDOW_MODE))?;
        let parsed = WindowMode::parse(&raw);
        if parsed.is_none() {
            warn!("persisted window mode {raw:?} of session {id} is unknown");
        }
        parsed
    }

    /// # Errors
    ///
    /// Propagates the underlying [`StorageError`].
    pub fn set_window_mode(&self, id: SessionId, mode: WindowMode) -> Result<(), StorageError> {
        self.store
            .set(&key(id, FIELD_WINDOW_MODE), mode.as_str().to_string())
    }

    pub fn get_requested_orientation(&self, id: SessionId) -> Option<Orientation> {
        self.get_json(id, FIELD_REQUESTED_ORIENTATION)
    }

    /// # Errors
    ///
    /// Propagates the underlying [`StorageError`].
    pub fn set_requested_orientation(
        &self,
        id: SessionId,
        orientation: Orientation,
    ) -> Result<(), StorageError> {
        self.set_json(id, FIELD_REQUESTED_ORIENTATION, &orientation)
    }

    pub fn get_last_state(&self, id: SessionId) -> Option<SessionState> {
        let raw = self.store.get(&key(id, FIELD_LAST_STATE))?;
        let parsed = SessionState::parse(&raw);
        if parsed.is_none() {
            warn!("persisted state {raw:?} of session {id} is unknown");
        }
        parsed
    }

    /// # Errors
    ///
    /// Propagates the underlying [`StorageError`].
    pub fn set_last_state(&self, id: SessionId, state: SessionState) -> Result<(), StorageError> {
        self.store
            .set(&key(id, FIELD_LAST_STATE), state.as_str().to_string())
    }

    /// Writes all four fields of `session`.
    ///
    /// # Errors
    ///
    /// Stops at the first field that fails to persist.
    pub fn save_bundle(&self, session: &SessionEntity) -> Result<(), StorageError> {
        let bundle = SessionBundle::of(session);
        self.set_rect(session.id, bundle.rect)?;
        self.set_window_mode(session.id, bundle.window_mode)?;
        self.set_requested_orientation(session.id, bundle.requested_orientation)?;
        self.set_last_state(session.id, bundle.last_state)
    }

    /// Reads the bundle back.  `None` unless all four fields are present and
    /// readable.
    pub fn load_bundle(&self, id: SessionId) -> Option<SessionBundle> {
        Some(SessionBundle {
            rect: self.get_rect(id)?,
            window_mode: self.get_window_mode(id)?,
            requested_orientation: self.get_requested_orientation(id)?,
            last_state: self.get_last_state(id)?,
        })
    }

    /// Removes every persisted field of `id`.
    ///
    /// # Errors
    ///
    /// Stops at the first key that fails to be removed.
    pub fn clear(&self, id: SessionId) -> Result<(), StorageError> {
        for k in self.store.keys_with_prefix(&prefix(id)) {
            self.store.remove(&k)?;
        }
        Ok(())
    }

    /// Ids that have at least one persisted field.
    pub fn persisted_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .store
            .keys_with_prefix("session.")
            .iter()
            .filter_map(|k| k.split('.').nth(1)?.parse().ok().map(SessionId))
            .collect();
        ids.dedup();
        ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::kv_store::MemoryStore;
    use wms_core::{ScreenId, SessionInfo, WindowType};

    fn store() -> (Arc<MemoryStore>, SessionStateStore) {
        let kv = Arc::new(MemoryStore::new());
        let states = SessionStateStore::new(kv.clone());
        (kv, states)
    }

    #[test]
    fn test_fields_are_stored_under_stable_keys() {
        // Arrange
        let (kv, states) = store();
        let id = SessionId(7);

        // Act
        states.set_rect(id, Rect::new(0, 0, 1080, 2340)).unwrap();
        states.set_window_mode(id, WindowMode::Floating).unwrap();
        states.set_last_state(id, SessionState::Background).unwrap();

        // Assert
        assert!(kv.get("session.7.rect").is_some());
        assert_eq!(kv.get("session.7.window_mode").as_deref(), Some("floating"));
        assert_eq!(kv.get("session.7.last_state").as_deref(), Some("background"));
    }

    #[test]
    fn test_bundle_reads_back_what_was_saved() {
        // Arrange
        let (_kv, states) = store();
        let info = SessionInfo::new("app", WindowType::AppMainWindow, ScreenId(0));
        let mut session = SessionEntity::from_info(SessionId(3), &info);
        session.rect = Rect::new(10, 20, 300, 400);
        session.window_mode = WindowMode::SplitPrimary;
        session.requested_orientation = Orientation::Horizontal;
        session.state = SessionState::Foreground;

        // Act
        states.save_bundle(&session).unwrap();
        let bundle = states.load_bundle(SessionId(3));

        // Assert
        assert_eq!(bundle, Some(SessionBundle::of(&session)));
    }

    #[test]
    fn test_partial_bundle_does_not_load() {
        let (_kv, states) = store();
        states.set_rect(SessionId(1), Rect::new(0, 0, 10, 10)).unwrap();
        assert_eq!(states.load_bundle(SessionId(1)), None);
    }

    #[test]
    fn test_unreadable_value_is_treated_as_absent() {
        let (kv, states) = store();
        kv.set("session.2.window_mode", "sideways".to_string()).unwrap();
        kv.set("session.2.rect", "not json".to_string()).unwrap();

        assert_eq!(states.get_window_mode(SessionId(2)), None);
        assert_eq!(states.get_rect(SessionId(2)), None);
    }

    #[test]
    fn test_clear_removes_only_that_session() {
        // Arrange
        let (kv, states) = store();
        states.set_last_state(SessionId(1), SessionState::Created).unwrap();
        states.set_last_state(SessionId(12), SessionState::Created).unwrap();

        // Act
        states.clear(SessionId(1)).unwrap();

        // Assert
        assert!(kv.get("session.1.last_state").is_none());
        assert!(kv.get("session.12.last_state").is_some());
        assert_eq!(states.persisted_ids(), vec![SessionId(12)]);
    }
}
