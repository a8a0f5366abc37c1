//! RPC facade: the client-facing surface of the service.
//!
//! [`WindowManagerService`] implements both service traits from
//! `wms_core::protocol::service` by delegating to the application layer.
//! Whatever transport carries requests (in-process `Arc`, a socket codec, a
//! binder-like IPC) only ever sees this type.
//!
//! # What happens on a call (for beginners)
//!
//! ```text
//! client ──► WindowManagerService ──► ScreenRegistry   (direct, locked)
//!                                 ├─► SessionRegistry  (direct, locked)
//!                                 ├─► FocusArbiter     (focus queue, timeout)
//!                                 └─► virtual screens  (screen queue, timeout)
//! ```
//!
//! Callers are identified by a [`CallerContext`].  The first call that
//! creates something on a caller's behalf starts watching its peer handle;
//! when the peer dies every virtual screen it created is destroyed.  Its
//! sessions are watched by the session registry itself.
//!
//! # Agents
//!
//! A registered [`DisplayManagerAgent`] is subscribed to the event streams
//! of its [`AgentType`]: screen connection and change events, screen group
//! events, or focus events.  Screen agents get a replay of the currently
//! connected screens on registration.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wms_core::protocol::events::{
    FocusChangeEvent, ScreenChange, ScreenConnectionEvent, ScreenGroupChange,
};
use wms_core::protocol::service::{
    AgentType, CallerContext, DisplayManagerAgent, DisplayManagerService, SceneSessionService,
};
use wms_core::runtime::peer::RecipientId;
use wms_core::{
    DisplayInfo, DmError, FocusChangeReason, Listener, ListenerId, Orientation, PeerHandle,
    ScreenId, ScreenInfo, SessionId, SessionInfo, SessionProperty, TaskQueue, VirtualScreenOption,
    WsError,
};

use crate::application::focus_arbiter::FocusArbiter;
use crate::application::screen_registry::ScreenRegistry;
use crate::application::session_registry::SessionRegistry;

/// One subscription held on behalf of an agent.
enum Subscription {
    Connection(Arc<dyn Listener<ScreenConnectionEvent>>),
    Change(ListenerId),
    Group(ListenerId),
    Focus(ListenerId),
}

struct AgentRegistration {
    agent: Arc<dyn DisplayManagerAgent>,
    agent_type: AgentType,
    subscriptions: Vec<Subscription>,
}

/// Outcome of a queued virtual screen creation, shared with a caller that
/// may stop waiting.  A creation that starts after the caller gave up is
/// skipped; one that finishes after the deadline is still handed over.
enum Handoff {
    Waiting,
    Abandoned,
    Delivered(ScreenId),
}

fn same_agent(a: &Arc<dyn DisplayManagerAgent>, b: &Arc<dyn DisplayManagerAgent>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Facade settings taken from the `[timing]` and `[server]` config sections.
#[derive(Debug, Clone, Copy)]
pub struct FacadeConfig {
    /// Deadline for virtual screen creation and destruction on the screen queue.
    pub virtual_screen_timeout: Duration,
    /// Density used for hot areas on displays that are not registered.
    pub default_density: f32,
}

pub struct WindowManagerService {
    screens: Arc<ScreenRegistry>,
    sessions: Arc<SessionRegistry>,
    focus: Arc<FocusArbiter>,
    screen_queue: Arc<dyn TaskQueue>,
    config: FacadeConfig,
    agents: Mutex<Vec<AgentRegistration>>,
    clients: Mutex<HashMap<Uuid, (PeerHandle, RecipientId)>>,
    weak_self: Weak<WindowManagerService>,
}

impl WindowManagerService {
    /// Wires the facade over the application layer.  Session hot areas are
    /// scaled by the virtual pixel ratio of their display from here on, or
    /// by the configured default density for an unknown display.
    pub fn new(
        screens: Arc<ScreenRegistry>,
        sessions: Arc<SessionRegistry>,
        focus: Arc<FocusArbiter>,
        screen_queue: Arc<dyn TaskQueue>,
        config: FacadeConfig,
    ) -> Arc<Self> {
        let density_source = Arc::clone(&screens);
        let default_density = config.default_density;
        sessions.set_density_provider(Box::new(move |display| {
            let density = density_source
                .display_info(display)
                .map(|info| info.virtual_pixel_ratio)
                .unwrap_or(default_density);
            Some(density)
        }));
        Arc::new_cyclic(|weak: &Weak<Self>| Self {
            screens,
            sessions,
            focus,
            screen_queue,
            config,
            agents: Mutex::new(Vec::new()),
            clients: Mutex::new(HashMap::new()),
            weak_self: weak.clone(),
        })
    }

    pub fn screens(&self) -> &Arc<ScreenRegistry> {
        &self.screens
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn focus(&self) -> &Arc<FocusArbiter> {
        &self.focus
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    // ── Clients ───────────────────────────────────────────────────────────────

    /// Starts watching the caller's peer.  Returns `false` if it is already
    /// dead.
    fn watch_client(&self, caller: &CallerContext) -> bool {
        let mut clients = self.clients.lock();
        if clients.contains_key(&caller.client_id) {
            return true;
        }
        let weak = self.weak_self.clone();
        let client = caller.client_id;
        let recipient = caller.peer.add_death_recipient(move || {
            if let Some(service) = weak.upgrade() {
                service.on_client_died(client);
            }
        });
        match recipient {
            Some(recipient) => {
                debug!("watching client {client} ({})", caller.peer.name());
                clients.insert(client, (caller.peer.clone(), recipient));
                true
            }
            None => false,
        }
    }

    /// The client's peer died: reclaim its virtual screens on the screen queue.
    pub fn on_client_died(&self, client: Uuid) {
        self.clients.lock().remove(&client);
        info!("client {client} died");
        let screens = Arc::clone(&self.screens);
        self.screen_queue.post(Box::new(move || {
            screens.on_client_died(client);
        }));
    }

    fn subscribe_agent(
        &self,
        agent: &Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<Vec<Subscription>, DmError> {
        let duplicate = || DmError::InvalidParam("agent listener already registered".into());
        let subscriptions = match agent_type {
            AgentType::ScreenEvent => {
                let target = Arc::clone(agent);
                let connection: Arc<dyn Listener<ScreenConnectionEvent>> =
                    Arc::new(move |e: &ScreenConnectionEvent| target.on_screen_connection(e));
                let target = Arc::clone(agent);
                let change = self
                    .screens
                    .change_listeners()
                    .subscribe(Arc::new(move |c: &ScreenChange| target.on_screen_change(c)))
                    .ok_or_else(duplicate)?;
                if let Err(e) = self
                    .screens
                    .register_connection_listener(Arc::clone(&connection))
                {
                    self.screens.change_listeners().unsubscribe(change);
                    return Err(e);
                }
                vec![Subscription::Change(change), Subscription::Connection(connection)]
            }
            AgentType::ScreenGroupEvent => {
                let target = Arc::clone(agent);
                let id = self
                    .screens
                    .group_listeners()
                    .subscribe(Arc::new(move |c: &ScreenGroupChange| {
                        target.on_screen_group_change(c)
                    }))
                    .ok_or_else(duplicate)?;
                vec![Subscription::Group(id)]
            }
            AgentType::FocusEvent => {
                let target = Arc::clone(agent);
                let id = self
                    .focus
                    .focus_listeners()
                    .subscribe(Arc::new(move |e: &FocusChangeEvent| target.on_focus_change(e)))
                    .ok_or_else(duplicate)?;
                vec![Subscription::Focus(id)]
            }
        };
        Ok(subscriptions)
    }

    fn unsubscribe(&self, subscription: Subscription) {
        match subscription {
            Subscription::Connection(listener) => {
                self.screens.unregister_connection_listener(&listener);
            }
            Subscription::Change(id) => {
                self.screens.change_listeners().unsubscribe(id);
            }
            Subscription::Group(id) => {
                self.screens.group_listeners().unsubscribe(id);
            }
            Subscription::Focus(id) => {
                self.focus.focus_listeners().unsubscribe(id);
            }
        }
    }
}

impl Drop for WindowManagerService {
    fn drop(&mut self) {
        for (_, (peer, recipient)) in self.clients.get_mut().drain() {
            peer.remove_death_recipient(recipient);
        }
    }
}

// ── DisplayManagerService ─────────────────────────────────────────────────────

impl DisplayManagerService for WindowManagerService {
    fn register_display_manager_agent(
        &self,
        agent: Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError> {
        let registered = self
            .agents
            .lock()
            .iter()
            .any(|r| r.agent_type == agent_type && same_agent(&r.agent, &agent));
        if registered {
            return Err(DmError::InvalidParam(format!(
                "agent already registered for {agent_type:?}"
            )));
        }
        // Subscribing replays connected screens to the agent; no lock held.
        let subscriptions = self.subscribe_agent(&agent, agent_type)?;
        self.agents.lock().push(AgentRegistration {
            agent,
            agent_type,
            subscriptions,
        });
        debug!("display manager agent registered for {agent_type:?}");
        Ok(())
    }

    fn unregister_display_manager_agent(
        &self,
        agent: &Arc<dyn DisplayManagerAgent>,
        agent_type: AgentType,
    ) -> Result<(), DmError> {
        let removed = {
            let mut agents = self.agents.lock();
            let position = agents
                .iter()
                .position(|r| r.agent_type == agent_type && same_agent(&r.agent, agent))
                .ok_or_else(|| {
                    DmError::InvalidParam(format!("agent not registered for {agent_type:?}"))
                })?;
            agents.remove(position)
        };
        for subscription in removed.subscriptions {
            self.unsubscribe(subscription);
        }
        debug!("display manager agent unregistered for {agent_type:?}");
        Ok(())
    }

    fn get_default_display_id(&self) -> ScreenId {
        self.screens.default_screen_id().unwrap_or(ScreenId::INVALID)
    }

    fn get_display_info_by_id(&self, display_id: ScreenId) -> Result<DisplayInfo, DmError> {
        self.screens.display_info(display_id)
    }

    fn get_screen_info(&self, screen_id: ScreenId) -> Result<ScreenInfo, DmError> {
        self.screens.screen_info(screen_id)
    }

    fn get_all_screen_ids(&self) -> Vec<ScreenId> {
        self.screens.all_screen_ids()
    }

    fn set_orientation(&self, screen_id: ScreenId, orientation: Orientation) -> Result<(), DmError> {
        self.screens.set_orientation(screen_id, orientation, false, true)
    }

    fn set_screen_active_mode(&self, screen_id: ScreenId, mode_idx: usize) -> Result<(), DmError> {
        self.screens.set_screen_active_mode(screen_id, mode_idx)
    }

    fn set_virtual_pixel_ratio(&self, screen_id: ScreenId, ratio: f32) -> Result<(), DmError> {
        self.screens.set_virtual_pixel_ratio(screen_id, ratio)
    }

    fn set_screen_rotation_locked(&self, screen_id: ScreenId, locked: bool) -> Result<(), DmError> {
        self.screens.set_screen_rotation_locked(screen_id, locked)
    }

    fn create_virtual_screen(&self, caller: &CallerContext, option: VirtualScreenOption) -> ScreenId {
        if !self.watch_client(caller) {
            warn!("virtual screen refused: client {} is dead", caller.client_id);
            return ScreenId::INVALID;
        }
        let screens = Arc::clone(&self.screens);
        let owner = caller.client_id;
        let handoff = Arc::new(Mutex::new(Handoff::Waiting));
        let task_handoff = Arc::clone(&handoff);
        let created = self.screen_queue.run_sync(self.config.virtual_screen_timeout, move || {
            let mut slot = task_handoff.lock();
            if matches!(*slot, Handoff::Abandoned) {
                debug!("virtual screen for client {owner} skipped: caller gave up");
                return Err(DmError::Timeout);
            }
            let result = screens.create_virtual_screen(option, owner);
            if let Ok(id) = result {
                *slot = Handoff::Delivered(id);
            }
            result
        });
        match created {
            Some(Ok(id)) => id,
            Some(Err(e)) => {
                warn!("virtual screen for client {owner} not created: {e}");
                ScreenId::INVALID
            }
            None => {
                let mut slot = handoff.lock();
                if let Handoff::Delivered(id) = *slot {
                    debug!("virtual screen {id} for client {owner} finished past the deadline");
                    return id;
                }
                *slot = Handoff::Abandoned;
                warn!("virtual screen for client {owner} timed out");
                ScreenId::INVALID
            }
        }
    }

    fn destroy_virtual_screen(&self, screen_id: ScreenId) -> Result<(), DmError> {
        let screens = Arc::clone(&self.screens);
        self.screen_queue
            .run_sync(self.config.virtual_screen_timeout, move || {
                screens.destroy_virtual_screen(screen_id)
            })
            .unwrap_or(Err(DmError::Timeout))
    }

    fn set_mirror(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.screens.set_mirror(source, targets)
    }

    fn make_expand(&self, source: ScreenId, targets: &[ScreenId]) -> Result<(), DmError> {
        self.screens.make_expand(source, targets)
    }

    fn remove_from_group(&self, screens: &[ScreenId]) -> Result<(), DmError> {
        self.screens.remove_from_group(screens)
    }
}

// ── SceneSessionService ───────────────────────────────────────────────────────

impl SceneSessionService for WindowManagerService {
    fn create_and_connect_specific_session(
        &self,
        caller: &CallerContext,
        info: SessionInfo,
    ) -> Result<SessionId, WsError> {
        self.sessions.create_session(info, Some(&caller.peer))
    }

    fn destroy_session(&self, id: SessionId) -> Result<(), WsError> {
        self.sessions.destroy_session(id)
    }

    fn foreground_session(&self, id: SessionId) -> Result<(), WsError> {
        self.sessions.foreground(id)
    }

    fn background_session(&self, id: SessionId) -> Result<(), WsError> {
        self.sessions.background(id)
    }

    /// A requested orientation is also forwarded to the session's display.
    fn update_property(&self, id: SessionId, property: SessionProperty) -> Result<(), WsError> {
        let orientation = match &property {
            SessionProperty::RequestedOrientation(o) => Some(*o),
            _ => None,
        };
        self.sessions.update_property(id, property)?;
        if let Some(orientation) = orientation {
            let display_id = self
                .sessions
                .session(id)
                .map(|s| s.display_id)
                .ok_or(WsError::InvalidSession(id))?;
            if let Err(e) = self.screens.set_orientation(display_id, orientation, true, false) {
                debug!("orientation request of session {id} not applied to {display_id}: {e}");
            }
        }
        Ok(())
    }

    fn recover_session(&self, caller: &CallerContext, id: SessionId) -> Result<(), WsError> {
        self.sessions.recover(id, Some(&caller.peer))
    }

    fn request_session_focus(
        &self,
        id: SessionId,
        by_foreground: bool,
        reason: FocusChangeReason,
    ) -> Result<(), WsError> {
        self.focus.request_session_focus(id, by_foreground, reason)
    }

    fn request_session_focus_immediately(&self, id: SessionId) -> Result<(), WsError> {
        self.focus.request_session_focus_immediately(id)
    }

    fn request_session_unfocus(&self, id: SessionId, reason: FocusChangeReason) -> Result<(), WsError> {
        self.focus.request_session_unfocus(id, reason)
    }

    fn get_focused_session_id(&self, display_id: ScreenId) -> SessionId {
        self.focus.get_focused_session_id(display_id)
    }

    fn dump_session_all(&self) -> String {
        self.sessions.dump_all()
    }

    fn dump_session_with_id(&self, id: SessionId) -> Result<String, WsError> {
        self.sessions.dump_session(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session_persistence::SessionStateStore;
    use crate::infrastructure::backend::headless::HeadlessBackend;
    use crate::infrastructure::storage::kv_store::MemoryStore;
    use wms_core::protocol::events::ScreenEvent;
    use wms_core::{DisplayMode, ImmediateTaskQueue, SerialTaskQueue, WindowType};

    #[derive(Default)]
    struct RecordingAgent {
        connections: Mutex<Vec<ScreenConnectionEvent>>,
        focus: Mutex<Vec<FocusChangeEvent>>,
    }

    impl DisplayManagerAgent for RecordingAgent {
        fn on_screen_connection(&self, event: &ScreenConnectionEvent) {
            self.connections.lock().push(event.clone());
        }

        fn on_focus_change(&self, event: &FocusChangeEvent) {
            self.focus.lock().push(*event);
        }
    }

    fn setup() -> (Arc<HeadlessBackend>, Arc<WindowManagerService>) {
        setup_with_screen_queue(ImmediateTaskQueue::new(), Duration::from_millis(500))
    }

    fn setup_with_screen_queue(
        screen_queue: Arc<dyn TaskQueue>,
        virtual_screen_timeout: Duration,
    ) -> (Arc<HeadlessBackend>, Arc<WindowManagerService>) {
        let backend = Arc::new(HeadlessBackend::new());
        let queue = ImmediateTaskQueue::new();
        let screens = Arc::new(ScreenRegistry::new(backend.clone()));
        let builtin = backend.connect_screen("builtin", vec![DisplayMode::new(1080, 2340, 60)], 3.0);
        screens.on_screen_change(builtin, ScreenEvent::Connected);
        let sessions = SessionRegistry::new(
            queue.clone(),
            SessionStateStore::new(Arc::new(MemoryStore::new())),
            Duration::from_millis(10),
        );
        let focus = FocusArbiter::new(Arc::clone(&sessions), queue.clone(), Duration::from_millis(500));
        let service = WindowManagerService::new(
            screens,
            sessions,
            focus,
            screen_queue,
            FacadeConfig {
                virtual_screen_timeout,
                default_density: 1.5,
            },
        );
        (backend, service)
    }

    #[test]
    fn test_screen_agent_gets_replay_and_cannot_register_twice() {
        // Arrange
        let (_backend, service) = setup();
        let agent = Arc::new(RecordingAgent::default());
        let handle: Arc<dyn DisplayManagerAgent> = agent.clone();

        // Act
        service
            .register_display_manager_agent(Arc::clone(&handle), AgentType::ScreenEvent)
            .unwrap();
        let again = service.register_display_manager_agent(Arc::clone(&handle), AgentType::ScreenEvent);

        // Assert
        assert_eq!(agent.connections.lock().len(), 1);
        assert!(matches!(again, Err(DmError::InvalidParam(_))));
        assert_eq!(service.agent_count(), 1);
    }

    #[test]
    fn test_unregistered_agent_stops_receiving() {
        let (_backend, service) = setup();
        let agent = Arc::new(RecordingAgent::default());
        let handle: Arc<dyn DisplayManagerAgent> = agent.clone();
        service
            .register_display_manager_agent(Arc::clone(&handle), AgentType::ScreenEvent)
            .unwrap();

        service
            .unregister_display_manager_agent(&handle, AgentType::ScreenEvent)
            .unwrap();
        let caller = CallerContext::new(PeerHandle::new("client"));
        service.create_virtual_screen(&caller, VirtualScreenOption::new("cast", 1920, 1080));

        assert_eq!(agent.connections.lock().len(), 1);
        assert!(service
            .unregister_display_manager_agent(&handle, AgentType::ScreenEvent)
            .is_err());
    }

    #[test]
    fn test_client_death_destroys_its_virtual_screens() {
        // Arrange
        let (_backend, service) = setup();
        let peer = PeerHandle::new("client");
        let caller = CallerContext::new(peer.clone());
        let id = service.create_virtual_screen(&caller, VirtualScreenOption::new("cast", 1920, 1080));
        assert!(id.is_valid());
        assert_eq!(service.get_all_screen_ids().len(), 2);

        // Act
        peer.notify_died();

        // Assert
        assert_eq!(service.get_all_screen_ids().len(), 1);
        assert!(matches!(
            service.get_screen_info(id),
            Err(DmError::ScreenNotFound(_))
        ));
    }

    #[test]
    fn test_virtual_screen_timed_out_by_caller_is_never_created() {
        // Arrange: a busy screen queue that outlasts the caller's deadline
        let queue = SerialTaskQueue::spawn("rpc-screen").unwrap();
        let dyn_queue: Arc<dyn TaskQueue> = queue.clone();
        let (_backend, service) = setup_with_screen_queue(dyn_queue.clone(), Duration::from_millis(50));
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        dyn_queue.post(Box::new(move || {
            let _ = blocked.recv();
        }));
        let caller = CallerContext::new(PeerHandle::new("client"));

        // Act
        let id = service.create_virtual_screen(&caller, VirtualScreenOption::new("late", 800, 600));
        release.send(()).unwrap();
        dyn_queue.run_sync(Duration::from_secs(2), || ()).unwrap();

        // Assert
        assert_eq!(id, ScreenId::INVALID);
        assert_eq!(service.get_all_screen_ids().len(), 1);
        queue.shutdown();
    }

    #[test]
    fn test_dead_caller_gets_invalid_virtual_screen() {
        let (_backend, service) = setup();
        let peer = PeerHandle::new("client");
        peer.notify_died();

        let id = service.create_virtual_screen(
            &CallerContext::new(peer),
            VirtualScreenOption::new("cast", 1920, 1080),
        );

        assert_eq!(id, ScreenId::INVALID);
    }

    #[test]
    fn test_zero_size_virtual_screen_is_invalid() {
        let (_backend, service) = setup();
        let caller = CallerContext::new(PeerHandle::new("client"));
        assert_eq!(
            service.create_virtual_screen(&caller, VirtualScreenOption::new("bad", 0, 1080)),
            ScreenId::INVALID
        );
    }

    #[test]
    fn test_focus_agent_sees_session_focus() {
        // Arrange
        let (_backend, service) = setup();
        let agent = Arc::new(RecordingAgent::default());
        service
            .register_display_manager_agent(agent.clone(), AgentType::FocusEvent)
            .unwrap();
        let caller = CallerContext::new(PeerHandle::new("app"));
        let display = service.get_default_display_id();

        // Act
        let id = service
            .create_and_connect_specific_session(
                &caller,
                SessionInfo::new("main", WindowType::AppMainWindow, display),
            )
            .unwrap();
        service.foreground_session(id).unwrap();

        // Assert
        assert_eq!(service.get_focused_session_id(display), id);
        assert!(matches!(
            agent.focus.lock().last(),
            Some(FocusChangeEvent::Focused(i)) if i.session_id == id
        ));
    }

    #[test]
    fn test_dump_session_with_unknown_id_is_invalid_session() {
        let (_backend, service) = setup();
        assert_eq!(
            service.dump_session_with_id(SessionId(77)),
            Err(WsError::InvalidSession(SessionId(77)))
        );
        let dump: serde_json::Value = serde_json::from_str(&service.dump_session_all()).unwrap();
        assert!(dump["sessions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_requested_orientation_reaches_the_display() {
        // Arrange
        let (backend, service) = setup();
        let display = service.get_default_display_id();
        let caller = CallerContext::new(PeerHandle::new("app"));
        let id = service
            .create_and_connect_specific_session(
                &caller,
                SessionInfo::new("main", WindowType::AppMainWindow, display),
            )
            .unwrap();

        // Act
        service
            .update_property(id, SessionProperty::RequestedOrientation(Orientation::Horizontal))
            .unwrap();

        // Assert
        let backend_id = service.screens().to_backend(display).unwrap();
        let (rotation, _) = backend.rotation_of(backend_id).unwrap();
        assert_ne!(rotation, wms_core::Rotation::Deg0);
        assert_eq!(
            service.get_screen_info(display).unwrap().orientation,
            Orientation::Horizontal
        );
    }
}
