//! Rendering backend adapter.
//!
//! The compositor that actually drives panels is an external service.  The
//! registries only need a narrow slice of it: screen enumeration, mode
//! query/set, rotation, and virtual screen creation/removal.  That slice is
//! the [`RenderBackend`] trait.
//!
//! # Testability
//!
//! [`headless::HeadlessBackend`] implements the trait entirely in memory and
//! is used both by the server binary (no real compositor attached) and by
//! tests.  Unit tests that need to force a backend failure use the
//! `mockall`-generated `MockRenderBackend`.

use thiserror::Error;
use wms_core::protocol::events::ScreenEvent;
use wms_core::{BackendScreenId, DisplayMode, Rotation, VirtualScreenOption};

pub mod headless;

/// Errors reported by the rendering backend.  These never cross the registry
/// boundary; the registry turns them into `DmError::Backend`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend screen {0} does not exist")]
    UnknownScreen(BackendScreenId),

    #[error("mode index {index} out of range for backend screen {screen}")]
    ModeOutOfRange { screen: BackendScreenId, index: usize },

    #[error("virtual screen rejected: {0}")]
    VirtualScreenRejected(String),

    #[error("backend unavailable")]
    Unavailable,
}

/// What the backend knows about one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendScreen {
    pub name: String,
    pub modes: Vec<DisplayMode>,
    /// Virtual pixel ratio the panel reports.
    pub density: f32,
}

/// A connection change reported by the backend for one of its screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendScreenEvent {
    pub backend_id: BackendScreenId,
    pub event: ScreenEvent,
}

#[cfg_attr(test, mockall::automock)]
pub trait RenderBackend: Send + Sync {
    /// Supported modes and capabilities of a connected screen.
    fn query_screen(&self, id: BackendScreenId) -> Result<BackendScreen, BackendError>;

    fn set_active_mode(&self, id: BackendScreenId, mode_idx: usize) -> Result<(), BackendError>;

    /// Applies `rotation`, wrapped in a timed animation transaction when
    /// `animate` is set.
    fn set_rotation(
        &self,
        id: BackendScreenId,
        rotation: Rotation,
        animate: bool,
    ) -> Result<(), BackendError>;

    fn create_virtual_screen(
        &self,
        option: &VirtualScreenOption,
    ) -> Result<BackendScreenId, BackendError>;

    fn remove_virtual_screen(&self, id: BackendScreenId) -> Result<(), BackendError>;
}
