//! Service traits: the request/response surface between clients and the
//! window management service.
//!
//! The server's RPC facade implements both traits; client adapters hold an
//! `Arc<dyn ...>` obtained from a service directory.  Every method returns its
//! typed error code as the primary result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{DmError, WsError};
use super::events::{FocusChangeEvent, ScreenChange, ScreenConnectionEvent, ScreenGroupChange};
use super::info::{DisplayInfo, ScreenInfo, VirtualScreenOption};
use crate::domain::focus::FocusChangeReason;
use crate::domain::rotation::Orientation;
use crate::domain::screen_identity::ScreenId;
use crate::domain::session::{SessionId, SessionInfo, SessionProperty};
use crate::runtime::peer::PeerHandle;

/// Who is calling.  The peer handle is monitored for death so that resources
/// the caller created can be reclaimed.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub client_id: Uuid,
    pub peer: PeerHandle,
}

impl CallerContext {
    pub fn new(peer: PeerHandle) -> Self {
        Self {
            client_id: peer.id(),
            peer,
        }
    }
}

/// Which event stream a display manager agent subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    ScreenEvent,
    ScreenGroupEvent,
    FocusEvent,
}

/// Client-side callback object registered with the display manager.  Each
/// method defaults to doing nothing so agents implement only what they need.
pub trait DisplayManagerAgent: Send + Sync {
    fn on_screen_connection(&self, _event: &ScreenConnectionEvent) {}
    fn on_screen_change(&self, _change: &ScreenChange) {}
    fn on_screen_group_change(&self, _change: &ScreenGroupChange) {}
    fn on_focus_change(&self, _event: &FocusChangeEvent) {}
}

/// Screen and display operations.
pub trait DisplayManagerService: Send + Sync {
    fn register_display_manager_agent(
        &self,
        agent: Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError>;

    fn unregister_display_manager_agent(
        &self,
        agent: &Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError>;

    /// `ScreenId::INVALID` when no screen is connected.
    fn get_default_display_id(&self) -> ScreenId;

    fn get_display_info_by_id(&self, display_id: ScreenId) -> Result<DisplayInfo, DmError>;

    fn get_screen_info(&self, screen_id: ScreenId) -> Result<ScreenInfo, DmError>;

    fn get_all_screen_ids(&self) -> Vec<ScreenId>;

    fn set_orientation(&self, screen_id: ScreenId, orientation: Orientation) -> Result<(), DmError>;

    fn set_screen_active_mode(&self, screen_id: ScreenId, mode_idx: usize) -> Result<(), DmError>;

    fn set_virtual_pixel_ratio(&self, screen_id: ScreenId, ratio: f32) -> Result<(), DmError>;

    fn set_screen_rotation_locked(&self, screen_id: ScreenId, locked: bool) -> Result<(), DmError>;

    /// Returns the new screen's logical id, or `ScreenId::INVALID` on failure
    /// or timeout.
    fn create_virtual_screen(&self, caller: &CallerContext, option: VirtualScreenOption) -> ScreenId;

    fn destroy_virtual_screen(&self, screen_id: ScreenId) -> Result<(), DmError>;

    fn set_mirror(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError>;

    fn make_expand(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError>;

    fn remove_from_group(&self, screens: &[ScreenId]) -> Result<(), DmError>;
}

/// Session lifecycle and focus operations.
pub trait SceneSessionService: Send + Sync {
    fn create_and_connect_specific_session(
        &self,
        caller: &CallerContext,
        info: SessionInfo,
    ) -> Result<SessionId, WsError>;

    fn destroy_session(&self, id: SessionId) -> Result<(), WsError>;

    fn foreground_session(&self, id: SessionId) -> Result<(), WsError>;

    fn background_session(&self, id: SessionId) -> Result<(), WsError>;

    fn update_property(&self, id: SessionId, property: SessionProperty) -> Result<(), WsError>;

    fn recover_session(&self, caller: &CallerContext, id: SessionId) -> Result<(), WsError>;

    fn request_session_focus(
        &self,
        id: SessionId,
        by_foreground: bool,
        reason: FocusChangeReason,
    ) -> Result<(), WsError>;

    fn request_session_focus_immediately(&self, id: SessionId) -> Result<(), WsError>;

    fn request_session_unfocus(&self, id: SessionId, reason: FocusChangeReason) -> Result<(), WsError>;

    /// `SessionId::INVALID` when nothing on that display holds focus.
    fn get_focused_session_id(&self, display_id: ScreenId) -> SessionId;

    fn dump_session_all(&self) -> String;

    fn dump_session_with_id(&self, id: SessionId) -> Result<String, WsError>;
}
