//! DisplayManagerAdapter: the client's view of the display manager.
//!
//! Every method goes through [`ProxyAdapter::call`].  When the service
//! cannot be reached the method returns [`DmError::ProxyNotReady`] (or
//! [`ScreenId::INVALID`] / an empty list where the operation has no error
//! channel) and the caller decides whether to try again later.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};
use wms_core::protocol::service::{
    AgentType, CallerContext, DisplayManagerAgent, DisplayManagerService,
};
use wms_core::{
    DisplayInfo, DmError, Orientation, PeerHandle, ScreenId, ScreenInfo, VirtualScreenOption,
};

use crate::infrastructure::proxy::directory::DISPLAY_MANAGER_SERVICE;
use crate::infrastructure::proxy::{ProxyAdapter, ProxyInvalidated, ServiceDirectory};

type AgentEntry = (Arc<dyn DisplayManagerAgent>, AgentType);

fn same_agent(a: &Arc<dyn DisplayManagerAgent>, b: &Arc<dyn DisplayManagerAgent>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

pub struct DisplayManagerAdapter {
    proxy: Arc<ProxyAdapter<dyn DisplayManagerService>>,
    caller: CallerContext,
    /// Agents registered through this adapter.  They die with the service.
    agents: Mutex<Vec<AgentEntry>>,
}

impl DisplayManagerAdapter {
    /// `client` is this process as the service sees it; virtual screens
    /// created here are destroyed when it dies.
    pub fn new(directory: Arc<dyn ServiceDirectory>, client: PeerHandle) -> Arc<Self> {
        let adapter = Arc::new(Self {
            proxy: ProxyAdapter::new(DISPLAY_MANAGER_SERVICE, directory),
            caller: CallerContext::new(client),
            agents: Mutex::new(Vec::new()),
        });
        let weak: Weak<Self> = Arc::downgrade(&adapter);
        adapter
            .proxy
            .invalidation_listeners()
            .subscribe(Arc::new(move |_: &ProxyInvalidated| {
                if let Some(adapter) = weak.upgrade() {
                    adapter.on_service_died();
                }
            }));
        adapter
    }

    pub fn proxy(&self) -> &Arc<ProxyAdapter<dyn DisplayManagerService>> {
        &self.proxy
    }

    pub fn registered_agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    fn on_service_died(&self) {
        let dropped = std::mem::take(&mut *self.agents.lock());
        info!(
            "display manager died; {} agent registration(s) lost",
            dropped.len()
        );
    }

    // ── Agents ────────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`DmError::ProxyNotReady`], or whatever the service rejects with.
    pub fn register_display_manager_agent(
        &self,
        agent: Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError> {
        let remote = Arc::clone(&agent);
        self.proxy.call(Err(DmError::ProxyNotReady), move |dms| {
            dms.register_display_manager_agent(remote, agent_type)
        })?;
        self.agents.lock().push((agent, agent_type));
        Ok(())
    }

    /// # Errors
    ///
    /// [`DmError::ProxyNotReady`], or whatever the service rejects with.
    pub fn unregister_display_manager_agent(
        &self,
        agent: &Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.unregister_display_manager_agent(agent, agent_type)
        })?;
        self.agents
            .lock()
            .retain(|(a, t)| !(same_agent(a, agent) && *t == agent_type));
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn get_default_display_id(&self) -> ScreenId {
        self.proxy
            .call(ScreenId::INVALID, |dms| dms.get_default_display_id())
    }

    /// # Errors
    ///
    /// [`DmError::ProxyNotReady`] or [`DmError::ScreenNotFound`].
    pub fn get_display_info_by_id(&self, display_id: ScreenId) -> Result<DisplayInfo, DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.get_display_info_by_id(display_id)
        })
    }

    /// # Errors
    ///
    /// [`DmError::ProxyNotReady`] or [`DmError::ScreenNotFound`].
    pub fn get_screen_info(&self, screen_id: ScreenId) -> Result<ScreenInfo, DmError> {
        self.proxy
            .call(Err(DmError::ProxyNotReady), |dms| dms.get_screen_info(screen_id))
    }

    /// Empty when the service is unreachable.
    pub fn get_all_screen_ids(&self) -> Vec<ScreenId> {
        self.proxy.call(Vec::new(), |dms| dms.get_all_screen_ids())
    }

    // ── Screen settings ───────────────────────────────────────────────────────

    pub fn set_orientation(&self, screen_id: ScreenId, orientation: Orientation) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.set_orientation(screen_id, orientation)
        })
    }

    pub fn set_screen_active_mode(&self, screen_id: ScreenId, mode_idx: usize) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.set_screen_active_mode(screen_id, mode_idx)
        })
    }

    pub fn set_virtual_pixel_ratio(&self, screen_id: ScreenId, ratio: f32) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.set_virtual_pixel_ratio(screen_id, ratio)
        })
    }

    pub fn set_screen_rotation_locked(&self, screen_id: ScreenId, locked: bool) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.set_screen_rotation_locked(screen_id, locked)
        })
    }

    // ── Virtual screens and groups ────────────────────────────────────────────

    /// [`ScreenId::INVALID`] if the service is unreachable or refuses.
    pub fn create_virtual_screen(&self, option: VirtualScreenOption) -> ScreenId {
        let name = option.name.clone();
        let id = self.proxy.call(ScreenId::INVALID, |dms| {
            dms.create_virtual_screen(&self.caller, option)
        });
        debug!("virtual screen {name} -> {id}");
        id
    }

    pub fn destroy_virtual_screen(&self, screen_id: ScreenId) -> Result<(), DmError> {
        self.proxy.call(Err(DmError::ProxyNotReady), |dms| {
            dms.destroy_virtual_screen(screen_id)
        })
    }

    pub fn set_mirror(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.proxy
            .call(Err(DmError::ProxyNotReady), |dms| dms.set_mirror(source, targets))
    }

    pub fn make_expand(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.proxy
            .call(Err(DmError::ProxyNotReady), |dms| dms.make_expand(source, targets))
    }

    pub fn remove_from_group(&self, screens: &[ScreenId]) -> Result<(), DmError> {
        self.proxy
            .call(Err(DmError::ProxyNotReady), |dms| dms.remove_from_group(screens))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::proxy::directory::LocalServiceDirectory;
    use crate::infrastructure::proxy::{MockServiceDirectory, RemoteObject};

    /// Answers every call with a fixed display and accepts every agent.
    struct FixedDisplay;

    impl DisplayManagerService for FixedDisplay {
        fn register_display_manager_agent(
            &self,
            _agent: Arc<dyn DisplayManagerAgent>,
            _agent_type: AgentType,
        ) -> Result<(), DmError> {
            Ok(())
        }

        fn unregister_display_manager_agent(
            &self,
            _agent: &Arc<dyn DisplayManagerAgent>,
            _agent_type: AgentType,
        ) -> Result<(), DmError> {
            Ok(())
        }

        fn get_default_display_id(&self) -> ScreenId {
            ScreenId(0)
        }

        fn get_display_info_by_id(&self, display_id: ScreenId) -> Result<DisplayInfo, DmError> {
            Err(DmError::ScreenNotFound(display_id))
        }

        fn get_screen_info(&self, screen_id: ScreenId) -> Result<ScreenInfo, DmError> {
            Err(DmError::ScreenNotFound(screen_id))
        }

        fn get_all_screen_ids(&self) -> Vec<ScreenId> {
            vec![ScreenId(0)]
        }

        fn set_orientation(&self, _: ScreenId, _: Orientation) -> Result<(), DmError> {
            Ok(())
        }

        fn set_screen_active_mode(&self, _: ScreenId, _: usize) -> Result<(), DmError> {
            Ok(())
        }

        fn set_virtual_pixel_ratio(&self, _: ScreenId, _: f32) -> Result<(), DmError> {
            Ok(())
        }

        fn set_screen_rotation_locked(&self, _: ScreenId, _: bool) -> Result<(), DmError> {
            Ok(())
        }

        fn create_virtual_screen(&self, _: &CallerContext, _: VirtualScreenOption) -> ScreenId {
            ScreenId(9)
        }

        fn destroy_virtual_screen(&self, _: ScreenId) -> Result<(), DmError> {
            Ok(())
        }

        fn set_mirror(&self, _: ScreenId, _: &[ScreenId]) -> Result<(), DmError> {
            Ok(())
        }

        fn make_expand(&self, _: ScreenId, _: &[ScreenId]) -> Result<(), DmError> {
            Ok(())
        }

        fn remove_from_group(&self, _: &[ScreenId]) -> Result<(), DmError> {
            Ok(())
        }
    }

    struct SilentAgent;

    impl DisplayManagerAgent for SilentAgent {}

    fn unreachable_adapter() -> Arc<DisplayManagerAdapter> {
        let mut directory = MockServiceDirectory::new();
        directory.expect_get_service().returning(|_| None);
        DisplayManagerAdapter::new(Arc::new(directory), PeerHandle::new("client"))
    }

    #[test]
    fn test_unreachable_service_yields_sentinels() {
        // Arrange
        let adapter = unreachable_adapter();

        // Act / Assert
        assert_eq!(adapter.get_default_display_id(), ScreenId::INVALID);
        assert!(adapter.get_all_screen_ids().is_empty());
        assert_eq!(
            adapter.create_virtual_screen(VirtualScreenOption::new("vs", 800, 600)),
            ScreenId::INVALID
        );
        assert_eq!(
            adapter.get_display_info_by_id(ScreenId(0)),
            Err(DmError::ProxyNotReady)
        );
        assert_eq!(
            adapter.set_mirror(ScreenId(0), &[ScreenId(1)]),
            Err(DmError::ProxyNotReady)
        );
    }

    #[test]
    fn test_failed_registration_is_not_remembered() {
        let adapter = unreachable_adapter();

        let result = adapter.register_display_manager_agent(Arc::new(SilentAgent), AgentType::FocusEvent);

        assert_eq!(result, Err(DmError::ProxyNotReady));
        assert_eq!(adapter.registered_agent_count(), 0);
    }

    #[test]
    fn test_service_death_forgets_agents() {
        // Arrange
        let host = PeerHandle::new("display-host");
        let directory = Arc::new(LocalServiceDirectory::new());
        let service: Arc<dyn DisplayManagerService> = Arc::new(FixedDisplay);
        directory.publish(DISPLAY_MANAGER_SERVICE, RemoteObject::remote(service, host.clone()));
        let adapter = DisplayManagerAdapter::new(directory, PeerHandle::new("client"));
        let agent: Arc<dyn DisplayManagerAgent> = Arc::new(SilentAgent);
        adapter
            .register_display_manager_agent(Arc::clone(&agent), AgentType::ScreenEvent)
            .unwrap();
        assert_eq!(adapter.registered_agent_count(), 1);

        // Act
        host.notify_died();

        // Assert
        assert_eq!(adapter.registered_agent_count(), 0);
        assert!(!adapter.proxy().is_connected());
    }

    #[test]
    fn test_unregister_removes_only_matching_type() {
        let directory = Arc::new(LocalServiceDirectory::new());
        let service: Arc<dyn DisplayManagerService> = Arc::new(FixedDisplay);
        directory.publish(DISPLAY_MANAGER_SERVICE, RemoteObject::local(service));
        let adapter = DisplayManagerAdapter::new(directory, PeerHandle::new("client"));
        let agent: Arc<dyn DisplayManagerAgent> = Arc::new(SilentAgent);
        adapter
            .register_display_manager_agent(Arc::clone(&agent), AgentType::ScreenEvent)
            .unwrap();
        adapter
            .register_display_manager_agent(Arc::clone(&agent), AgentType::FocusEvent)
            .unwrap();

        adapter
            .unregister_display_manager_agent(&agent, AgentType::ScreenEvent)
            .unwrap();

        assert_eq!(adapter.registered_agent_count(), 1);
        assert_eq!(adapter.create_virtual_screen(VirtualScreenOption::new("vs", 1, 1)), ScreenId(9));
    }
}
