//! Session entity: one window tracked by the service.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Initial ──connect──► Created ──foreground──► Foreground ──set_active(true)──► Active
//!                         ▲                      │   ▲                             │
//!                         │                background │                     set_active(false)
//!                         │                      ▼   │ foreground                  │
//!                         └─────────────────  Background ◄──── background ────────┘
//!
//! any state ──destroy──► Destroyed
//! ```
//!
//! `Active` means "foreground and focused".  A session may only become active
//! while it is foreground, visible, focusable and not force-hidden.
//!
//! Relationships (parent, sub-sessions, dialogs) are stored as ids and
//! resolved through the registry.  An id that no longer resolves is simply
//! skipped, so destruction order never matters.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::Rect;
use super::rotation::Orientation;
use super::screen_identity::ScreenId;
use crate::protocol::errors::WsError;

/// Persistent session id, stable across client reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i32);

impl SessionId {
    pub const INVALID: SessionId = SessionId(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowType {
    #[default]
    AppMainWindow,
    AppSubWindow,
    Dialog,
    Pip,
    Float,
    SystemAlert,
    Keyguard,
}

impl WindowType {
    pub fn is_main(self) -> bool {
        self == WindowType::AppMainWindow
    }
}

/// Policy-driven hiding that suppresses focus eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForceHideState {
    #[default]
    NotHidden,
    Hidden,
    /// Hidden whenever it would otherwise gain focus (e.g. under keyguard).
    HiddenWhenFocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowMode {
    #[default]
    Fullscreen,
    Floating,
    SplitPrimary,
    SplitSecondary,
    Pip,
}

impl WindowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowMode::Fullscreen => "fullscreen",
            WindowMode::Floating => "floating",
            WindowMode::SplitPrimary => "split_primary",
            WindowMode::SplitSecondary => "split_secondary",
            WindowMode::Pip => "pip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "fullscreen" => WindowMode::Fullscreen,
            "floating" => WindowMode::Floating,
            "split_primary" => WindowMode::SplitPrimary,
            "split_secondary" => WindowMode::SplitSecondary,
            "pip" => WindowMode::Pip,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Initial,
    Created,
    Foreground,
    Active,
    Background,
    Destroyed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initial => "initial",
            SessionState::Created => "created",
            SessionState::Foreground => "foreground",
            SessionState::Active => "active",
            SessionState::Background => "background",
            SessionState::Destroyed => "destroyed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "initial" => SessionState::Initial,
            "created" => SessionState::Created,
            "foreground" => SessionState::Foreground,
            "active" => SessionState::Active,
            "background" => SessionState::Background,
            "destroyed" => SessionState::Destroyed,
            _ => return None,
        })
    }
}

/// Creation request sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub window_type: WindowType,
    pub display_id: ScreenId,
    pub parent_id: Option<SessionId>,
    pub rect: Rect,
    pub z_order: u32,
    /// Set when reconnecting a session the client already knows.
    pub persistent_id: Option<SessionId>,
    /// Keep the session's state for recovery when its client dies.
    pub recoverable: bool,
    pub topmost: bool,
    pub modal: bool,
    pub focusable: bool,
    pub blocking_focus: bool,
}

impl SessionInfo {
    pub fn new(name: impl Into<String>, window_type: WindowType, display_id: ScreenId) -> Self {
        Self {
            name: name.into(),
            window_type,
            display_id,
            parent_id: None,
            rect: Rect::default(),
            z_order: 0,
            persistent_id: None,
            recoverable: false,
            topmost: false,
            modal: false,
            focusable: true,
            blocking_focus: false,
        }
    }
}

/// A single property update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionProperty {
    Rect(Rect),
    Visible(bool),
    Focusable(bool),
    Touchable(bool),
    ZOrder(u32),
    Topmost(bool),
    Modal(bool),
    BlockingFocus(bool),
    FocusedOnShow(bool),
    FocusableOnShow(bool),
    ForceHide(ForceHideState),
    TouchHotAreas(Vec<Rect>),
    WindowMode(WindowMode),
    RequestedOrientation(Orientation),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntity {
    pub id: SessionId,
    pub name: String,
    pub window_type: WindowType,
    pub display_id: ScreenId,
    pub rect: Rect,
    pub z_order: u32,
    pub parent_id: Option<SessionId>,
    pub sub_sessions: Vec<SessionId>,
    pub dialogs: Vec<SessionId>,
    pub focusable: bool,
    pub touchable: bool,
    pub visible: bool,
    pub topmost: bool,
    pub modal: bool,
    pub blocking_focus: bool,
    pub focused_on_show: bool,
    pub focusable_on_show: bool,
    pub force_hide: ForceHideState,
    pub is_focused: bool,
    pub state: SessionState,
    pub touch_hot_areas: Vec<Rect>,
    pub window_mode: WindowMode,
    pub requested_orientation: Orientation,
    pub recoverable: bool,
    pub owner: Option<Uuid>,
}

impl SessionEntity {
    /// Builds a session in the `Initial` state.
    pub fn from_info(id: SessionId, info: &SessionInfo) -> Self {
        Self {
            id,
            name: info.name.clone(),
            window_type: info.window_type,
            display_id: info.display_id,
            rect: info.rect,
            z_order: info.z_order,
            parent_id: info.parent_id,
            sub_sessions: Vec::new(),
            dialogs: Vec::new(),
            focusable: info.focusable,
            touchable: true,
            visible: true,
            topmost: info.topmost,
            modal: info.modal,
            blocking_focus: info.blocking_focus,
            focused_on_show: true,
            focusable_on_show: true,
            force_hide: ForceHideState::NotHidden,
            is_focused: false,
            state: SessionState::Initial,
            touch_hot_areas: Vec::new(),
            window_mode: WindowMode::default(),
            requested_orientation: Orientation::Unspecified,
            recoverable: info.recoverable,
            owner: None,
        }
    }

    /// Foreground or active.
    pub fn is_foreground(&self) -> bool {
        matches!(self.state, SessionState::Foreground | SessionState::Active)
    }

    pub fn is_modal_topmost(&self) -> bool {
        self.modal && self.topmost
    }

    /// Whether this session belongs in its parent's dialog list rather than
    /// its sub-session list.
    pub fn is_dialog_like(&self) -> bool {
        self.window_type == WindowType::Dialog
            || (self.window_type == WindowType::AppSubWindow && self.modal)
    }

    fn can_activate(&self) -> bool {
        self.state == SessionState::Foreground
            && self.visible
            && self.focusable
            && self.force_hide == ForceHideState::NotHidden
    }

    /// `Initial → Created`.
    pub fn connect(&mut self) -> Result<(), WsError> {
        match self.state {
            SessionState::Initial => {
                self.state = SessionState::Created;
                Ok(())
            }
            SessionState::Created => Err(WsError::DoNothing),
            _ => Err(WsError::InvalidOperation),
        }
    }

    /// `Created | Background → Foreground`.
    pub fn foreground(&mut self) -> Result<(), WsError> {
        match self.state {
            SessionState::Created | SessionState::Background => {
                self.state = SessionState::Foreground;
                Ok(())
            }
            SessionState::Foreground | SessionState::Active => Err(WsError::DoNothing),
            SessionState::Initial | SessionState::Destroyed => Err(WsError::InvalidOperation),
        }
    }

    /// `Foreground | Active → Background`.  An active session is deactivated
    /// on the way.
    pub fn background(&mut self) -> Result<(), WsError> {
        match self.state {
            SessionState::Foreground | SessionState::Active => {
                self.state = SessionState::Background;
                Ok(())
            }
            SessionState::Background => Err(WsError::DoNothing),
            _ => Err(WsError::InvalidOperation),
        }
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), WsError> {
        match (active, self.state) {
            (true, SessionState::Active) | (false, SessionState::Foreground) => Err(WsError::DoNothing),
            (true, _) if self.can_activate() => {
                self.state = SessionState::Active;
                Ok(())
            }
            (true, _) => Err(WsError::InvalidOperation),
            (false, SessionState::Active) => {
                self.state = SessionState::Foreground;
                Ok(())
            }
            (false, _) => Err(WsError::DoNothing),
        }
    }

    /// Any state `→ Destroyed`.
    pub fn destroy(&mut self) -> Result<(), WsError> {
        if self.state == SessionState::Destroyed {
            return Err(WsError::DoNothing);
        }
        self.state = SessionState::Destroyed;
        self.is_focused = false;
        Ok(())
    }

    /// Applies `property`.  Returns `true` if anything changed.
    pub fn apply_property(&mut self, property: SessionProperty) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        }
        match property {
            SessionProperty::Rect(v) => set(&mut self.rect, v),
            SessionProperty::Visible(v) => set(&mut self.visible, v),
            SessionProperty::Focusable(v) => set(&mut self.focusable, v),
            SessionProperty::Touchable(v) => set(&mut self.touchable, v),
            SessionProperty::ZOrder(v) => set(&mut self.z_order, v),
            SessionProperty::Topmost(v) => set(&mut self.topmost, v),
            SessionProperty::Modal(v) => set(&mut self.modal, v),
            SessionProperty::BlockingFocus(v) => set(&mut self.blocking_focus, v),
            SessionProperty::FocusedOnShow(v) => set(&mut self.focused_on_show, v),
            SessionProperty::FocusableOnShow(v) => set(&mut self.focusable_on_show, v),
            SessionProperty::ForceHide(v) => set(&mut self.force_hide, v),
            SessionProperty::TouchHotAreas(v) => set(&mut self.touch_hot_areas, v),
            SessionProperty::WindowMode(v) => set(&mut self.window_mode, v),
            SessionProperty::RequestedOrientation(v) => set(&mut self.requested_orientation, v),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
