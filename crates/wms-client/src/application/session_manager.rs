//! SessionManagerAdapter: the client's view of the scene session manager.
//!
//! Same contract as the display adapter: an unreachable service yields
//! [`WsError::ProxyNotReady`], [`SessionId::INVALID`] or an empty dump, and
//! nothing is retried.

use std::sync::Arc;

use tracing::warn;
use wms_core::protocol::service::{CallerContext, SceneSessionService};
use wms_core::{FocusChangeReason, PeerHandle, ScreenId, SessionId, SessionInfo, SessionProperty, WsError};

use crate::infrastructure::proxy::directory::SCENE_SESSION_SERVICE;
use crate::infrastructure::proxy::{ProxyAdapter, ServiceDirectory};

pub struct SessionManagerAdapter {
    proxy: Arc<ProxyAdapter<dyn SceneSessionService>>,
    caller: CallerContext,
}

impl SessionManagerAdapter {
    /// `client` owns every session created here; its death is reported to
    /// the service.
    pub fn new(directory: Arc<dyn ServiceDirectory>, client: PeerHandle) -> Self {
        Self {
            proxy: ProxyAdapter::new(SCENE_SESSION_SERVICE, directory),
            caller: CallerContext::new(client),
        }
    }

    pub fn proxy(&self) -> &Arc<ProxyAdapter<dyn SceneSessionService>> {
        &self.proxy
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn create_and_connect_specific_session(&self, info: SessionInfo) -> Result<SessionId, WsError> {
        self.proxy.call(Err(WsError::ProxyNotReady), |ssm| {
            ssm.create_and_connect_specific_session(&self.caller, info)
        })
    }

    pub fn destroy_session(&self, id: SessionId) -> Result<(), WsError> {
        self.proxy
            .call(Err(WsError::ProxyNotReady), |ssm| ssm.destroy_session(id))
    }

    pub fn foreground_session(&self, id: SessionId) -> Result<(), WsError> {
        self.proxy
            .call(Err(WsError::ProxyNotReady), |ssm| ssm.foreground_session(id))
    }

    pub fn background_session(&self, id: SessionId) -> Result<(), WsError> {
        self.proxy
            .call(Err(WsError::ProxyNotReady), |ssm| ssm.background_session(id))
    }

    pub fn update_property(&self, id: SessionId, property: SessionProperty) -> Result<(), WsError> {
        self.proxy
            .call(Err(WsError::ProxyNotReady), |ssm| ssm.update_property(id, property))
    }

    /// Reclaims a session left pending recovery, making this client its owner.
    pub fn recover_session(&self, id: SessionId) -> Result<(), WsError> {
        self.proxy.call(Err(WsError::ProxyNotReady), |ssm| {
            ssm.recover_session(&self.caller, id)
        })
    }

    // ── Focus ─────────────────────────────────────────────────────────────────

    pub fn request_session_focus(
        &self,
        id: SessionId,
        by_foreground: bool,
        reason: FocusChangeReason,
    ) -> Result<(), WsError> {
        self.proxy.call(Err(WsError::ProxyNotReady), |ssm| {
            ssm.request_session_focus(id, by_foreground, reason)
        })
    }

    pub fn request_session_focus_immediately(&self, id: SessionId) -> Result<(), WsError> {
        self.proxy.call(Err(WsError::ProxyNotReady), |ssm| {
            ssm.request_session_focus_immediately(id)
        })
    }

    pub fn request_session_unfocus(&self, id: SessionId, reason: FocusChangeReason) -> Result<(), WsError> {
        self.proxy.call(Err(WsError::ProxyNotReady), |ssm| {
            ssm.request_session_unfocus(id, reason)
        })
    }

    /// [`SessionId::INVALID`] when nothing is focused or the service is
    /// unreachable.
    pub fn get_focused_session_id(&self, display_id: ScreenId) -> SessionId {
        self.proxy.call(SessionId::INVALID, |ssm| {
            ssm.get_focused_session_id(display_id)
        })
    }

    // ── Diagnostics ───────────────────────────────────────────────────────────

    /// Empty when the service is unreachable.
    pub fn dump_session_all(&self) -> String {
        let dump = self.proxy.call(None, |ssm| Some(ssm.dump_session_all()));
        dump.unwrap_or_else(|| {
            warn!("session dump unavailable: proxy not ready");
            String::new()
        })
    }

    pub fn dump_session_with_id(&self, id: SessionId) -> Result<String, WsError> {
        self.proxy
            .call(Err(WsError::ProxyNotReady), |ssm| ssm.dump_session_with_id(id))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
