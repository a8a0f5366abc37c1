//! Event payloads fanned out through `Subject`s.

use serde::{Deserialize, Serialize};

use super::info::ScreenInfo;
use crate::domain::focus::{DisplayGroupId, FocusChangeReason};
use crate::domain::screen_identity::ScreenId;
use crate::domain::session::{SessionId, WindowType};

/// Raw connection event reported by the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenEvent {
    Connected,
    Disconnected,
    /// A value this service does not understand; logged and ignored.
    Unknown(u32),
}

/// Delivered to screen-connection listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScreenConnectionEvent {
    Connected(ScreenInfo),
    Disconnected(ScreenId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenChangeEvent {
    UpdateOrientation,
    UpdateRotation,
    ChangeMode,
    VirtualPixelRatioChanged,
}

/// Delivered to screen-change listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenChange {
    pub info: ScreenInfo,
    pub event: ScreenChangeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenGroupChangeEvent {
    /// The screen was ungrouped and joined a group.
    AddToGroup,
    /// The screen left its group.
    RemoveFromGroup,
    /// The screen moved from one group to another.
    ChangeGroup,
}

/// Delivered to screen-group listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGroupChange {
    pub screen_id: ScreenId,
    pub group_id: ScreenId,
    pub event: ScreenGroupChangeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusChangeInfo {
    pub session_id: SessionId,
    pub display_id: ScreenId,
    pub display_group: DisplayGroupId,
    pub window_type: WindowType,
    pub reason: FocusChangeReason,
}

/// One half of a focus transition.  A transition produces at most one
/// `Unfocused` followed by at most one `Focused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChangeEvent {
    Unfocused(FocusChangeInfo),
    Focused(FocusChangeInfo),
}
