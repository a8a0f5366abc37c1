//! FocusArbiter: decides which session holds focus in each display group.
//!
//! # One decision at a time
//!
//! Every focus mutation goes through [`FocusArbiter::shift_focus`] under a
//! single decision lock, and every request that arrives from outside is run
//! on the focus queue.  Session lifecycle events are not handled inline
//! either: the arbiter's lifecycle listener posts them to the same queue.
//! Two sessions can therefore never both end up focused.
//!
//! # Request resolution
//!
//! ```text
//! request(id) ── eligible? ──► redirect to highest-z eligible dialog /
//!                              modal-topmost descendant (repeat) ──►
//!              blocking / topmost denial (non-client requests) ──► shift
//! ```
//!
//! # Unfocus replacement
//!
//! When the focused session gives up focus, the replacement is, in order:
//! 1. the highest-z focus candidate in the same group that is a child of the
//!    leaving session or sits below it,
//! 2. the group's last focused session, if still a candidate,
//! 3. the group's last focused main window, if still a candidate,
//! 4. nobody.
//!
//! # Lock order
//!
//! decision lock, then arbiter state, then the session registry.  Focus
//! listeners are notified with only the decision lock held.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info};
use wms_core::domain::focus::{
    check_click_focus_is_down_through_full_screen, check_focus_is_down_through_blocking_type,
    check_topmost_window_focus, highest_z, is_focus_candidate, is_redirect_target,
};
use wms_core::protocol::events::{FocusChangeEvent, FocusChangeInfo};
use wms_core::{
    DisplayGroupId, FocusChangeReason, FocusGroup, ForceHideState, ScreenId, SessionEntity,
    SessionId, Subject, TaskQueue, WsError,
};

use super::session_registry::{SessionLifecycleEvent, SessionRegistry};

type Sessions = BTreeMap<SessionId, SessionEntity>;

struct ArbiterState {
    groups: BTreeMap<DisplayGroupId, FocusGroup>,
    display_groups: HashMap<ScreenId, DisplayGroupId>,
    next_group: u64,
}

impl ArbiterState {
    fn group_id(&self, display: ScreenId) -> DisplayGroupId {
        self.display_groups
            .get(&display)
            .copied()
            .unwrap_or(DisplayGroupId::DEFAULT)
    }

    fn group_mut(&mut self, id: DisplayGroupId) -> &mut FocusGroup {
        self.groups.entry(id).or_insert_with(|| FocusGroup::new(id))
    }

    fn focused_in(&self, id: DisplayGroupId) -> SessionId {
        self.groups
            .get(&id)
            .map(|g| g.focused_session_id)
            .unwrap_or(SessionId::INVALID)
    }
}

fn change_info(
    session: &SessionEntity,
    group: DisplayGroupId,
    reason: FocusChangeReason,
) -> FocusChangeInfo {
    FocusChangeInfo {
        session_id: session.id,
        display_id: session.display_id,
        display_group: group,
        window_type: session.window_type,
        reason,
    }
}

/// Follows eligible dialog / modal-topmost children down from `start`,
/// taking the highest z-order at each level.
fn redirect_target<'a>(sessions: &'a Sessions, start: &'a SessionEntity) -> &'a SessionEntity {
    let mut current = start;
    let mut visited = HashSet::from([start.id]);
    loop {
        let owner = current.id;
        let children = current
            .dialogs
            .iter()
            .chain(current.sub_sessions.iter())
            .filter_map(|id| sessions.get(id))
            .filter(|c| {
                c.parent_id == Some(owner)
                    && (c.is_dialog_like() || c.is_modal_topmost())
                    && is_redirect_target(c)
                    && !visited.contains(&c.id)
            });
        let next = highest_z(children);
        match next {
            Some(child) => {
                debug!("focus on {owner} redirected to child {}", child.id);
                visited.insert(child.id);
                current = child;
            }
            None => return current,
        }
    }
}

pub struct FocusArbiter {
    sessions: Arc<SessionRegistry>,
    queue: Arc<dyn TaskQueue>,
    timeout: Duration,
    decision: ReentrantMutex<()>,
    state: Mutex<ArbiterState>,
    listeners: Subject<FocusChangeEvent>,
}

impl FocusArbiter {
    /// Builds the arbiter and subscribes it to `sessions`' lifecycle events.
    /// `queue` is the focus subsystem queue; `timeout` bounds how long a
    /// blocking request waits for it.
    pub fn new(sessions: Arc<SessionRegistry>, queue: Arc<dyn TaskQueue>, timeout: Duration) -> Arc<Self> {
        let mut groups = BTreeMap::new();
        groups.insert(DisplayGroupId::DEFAULT, FocusGroup::new(DisplayGroupId::DEFAULT));
        let arbiter = Arc::new(Self {
            sessions,
            queue,
            timeout,
            decision: ReentrantMutex::new(()),
            state: Mutex::new(ArbiterState {
                groups,
                display_groups: HashMap::new(),
                next_group: 1,
            }),
            listeners: Subject::new(),
        });

        let weak = Arc::downgrade(&arbiter);
        let queue = Arc::clone(&arbiter.queue);
        arbiter
            .sessions
            .lifecycle()
            .subscribe(Arc::new(move |event: &SessionLifecycleEvent| {
                let weak = weak.clone();
                let event = event.clone();
                queue.post(Box::new(move || {
                    if let Some(arbiter) = weak.upgrade() {
                        arbiter.on_lifecycle(event);
                    }
                }));
            }));
        arbiter
    }

    pub fn focus_listeners(&self) -> &Subject<FocusChangeEvent> {
        &self.listeners
    }

    // ── Focus groups ──────────────────────────────────────────────────────────

    /// Gives `display_id` its own focus group.  Idempotent.
    pub fn add_focus_group(&self, display_id: ScreenId) -> DisplayGroupId {
        let _decision = self.decision.lock();
        let mut state = self.state.lock();
        if let Some(existing) = state.display_groups.get(&display_id) {
            return *existing;
        }
        let id = DisplayGroupId(state.next_group);
        state.next_group += 1;
        state.display_groups.insert(display_id, id);
        state.groups.insert(id, FocusGroup::new(id));
        info!("focus group {id} added for display {display_id}");
        id
    }

    /// Returns `display_id` to the default group.  Whoever held focus in its
    /// own group loses it.  Returns `false` if it had no group of its own.
    pub fn remove_focus_group(&self, display_id: ScreenId) -> bool {
        let _decision = self.decision.lock();
        let removed = {
            let mut state = self.state.lock();
            let Some(id) = state.display_groups.remove(&display_id) else {
                return false;
            };
            state.groups.remove(&id).map(|g| (id, g.focused_session_id))
        };
        if let Some((id, focused)) = removed {
            info!("focus group {id} of display {display_id} removed");
            if let Some(session) = self.sessions.session(focused) {
                let _ = self.sessions.set_focused(focused, false);
                self.listeners.notify(&FocusChangeEvent::Unfocused(change_info(
                    &session,
                    id,
                    FocusChangeReason::Default,
                )));
            }
        }
        true
    }

    pub fn group_of(&self, display: ScreenId) -> DisplayGroupId {
        self.state.lock().group_id(display)
    }

    /// Sets the notification suppression flags of `display`'s group.
    pub fn set_notify_suppression(&self, display: ScreenId, until_foreground: bool, unfocus: bool) {
        let _decision = self.decision.lock();
        let mut state = self.state.lock();
        let id = state.group_id(display);
        let group = state.group_mut(id);
        group.block_notify_until_foreground = until_foreground;
        group.block_notify_unfocus = unfocus;
    }

    pub fn get_focused_session_id(&self, display: ScreenId) -> SessionId {
        let state = self.state.lock();
        state.focused_in(state.group_id(display))
    }

    pub fn focus_group_snapshot(&self, display: ScreenId) -> FocusGroup {
        let state = self.state.lock();
        let id = state.group_id(display);
        state
            .groups
            .get(&id)
            .cloned()
            .unwrap_or_else(|| FocusGroup::new(id))
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Runs a focus request on the focus queue and waits for the decision.
    ///
    /// # Errors
    ///
    /// - [`WsError::DoNothing`] if the session is unknown, not a candidate,
    ///   already focused, or a denial rule applies.
    /// - [`WsError::InvalidOperation`] if it is hidden whenever focused.
    /// - [`WsError::Timeout`] if the queue did not answer in time.
    pub fn request_session_focus(
        self: &Arc<Self>,
        id: SessionId,
        by_foreground: bool,
        reason: FocusChangeReason,
    ) -> Result<(), WsError> {
        let arbiter = Arc::clone(self);
        self.queue
            .run_sync(self.timeout, move || arbiter.focus_now(id, by_foreground, reason))
            .unwrap_or(Err(WsError::Timeout))
    }

    /// Foreground-driven focus, decided on the calling thread.  Every failed
    /// precondition is [`WsError::DoNothing`]: losing a race with a
    /// background transition is expected.
    ///
    /// # Errors
    ///
    /// Only [`WsError::DoNothing`].
    pub fn request_session_focus_immediately(&self, id: SessionId) -> Result<(), WsError> {
        self.focus_now(id, true, FocusChangeReason::Foreground)
            .map_err(|e| {
                debug!("immediate focus of {id} not applied: {e}");
                WsError::DoNothing
            })
    }

    /// Runs an unfocus request on the focus queue and waits for it.
    ///
    /// # Errors
    ///
    /// - [`WsError::DoNothing`] if the session does not hold focus.
    /// - [`WsError::Timeout`] if the queue did not answer in time.
    pub fn request_session_unfocus(
        self: &Arc<Self>,
        id: SessionId,
        reason: FocusChangeReason,
    ) -> Result<(), WsError> {
        let arbiter = Arc::clone(self);
        self.queue
            .run_sync(self.timeout, move || arbiter.unfocus_now(id, reason))
            .unwrap_or(Err(WsError::Timeout))
    }

    /// Moves focus straight to `next`, with no eligibility checks.
    ///
    /// # Errors
    ///
    /// [`WsError::InvalidSession`] for an unknown id, [`WsError::DoNothing`]
    /// if it already holds focus.
    pub fn shift_focus(&self, next: SessionId, reason: FocusChangeReason) -> Result<(), WsError> {
        let _decision = self.decision.lock();
        let display = self
            .sessions
            .session(next)
            .ok_or(WsError::InvalidSession(next))?
            .display_id;
        let group = self.group_of(display);
        self.shift_focus_in(group, next, None, reason)
    }

    /// `true` when a click on `clicked` must not take focus from `focused`.
    /// Unknown ids never deny.
    pub fn check_click_focus_is_down_through_full_screen(
        &self,
        focused: SessionId,
        clicked: SessionId,
        reason: FocusChangeReason,
    ) -> bool {
        self.sessions.with_sessions(|sessions| {
            match (sessions.get(&focused), sessions.get(&clicked)) {
                (Some(f), Some(c)) => check_click_focus_is_down_through_full_screen(f, c, reason),
                _ => false,
            }
        })
    }

    // ── Decisions ─────────────────────────────────────────────────────────────

    fn focus_now(&self, id: SessionId, by_foreground: bool, reason: FocusChangeReason) -> Result<(), WsError> {
        let _decision = self.decision.lock();
        let Some(display) = self.sessions.session(id).map(|s| s.display_id) else {
            debug!("focus request for unknown session {id}");
            return Err(WsError::DoNothing);
        };
        let (group, focused) = {
            let state = self.state.lock();
            let group = state.group_id(display);
            (group, state.focused_in(group))
        };
        let target = self.resolve_target(id, by_foreground, reason, focused)?;
        if target == focused {
            return Err(WsError::DoNothing);
        }
        self.shift_focus_in(group, target, None, reason)
    }

    fn resolve_target(
        &self,
        id: SessionId,
        by_foreground: bool,
        reason: FocusChangeReason,
        focused: SessionId,
    ) -> Result<SessionId, WsError> {
        self.sessions.with_sessions(|sessions| {
            let session = sessions.get(&id).ok_or(WsError::DoNothing)?;
            let refused = !session.is_foreground()
                || !session.visible
                || !session.focusable
                || !session.focused_on_show
                || (by_foreground && !session.focusable_on_show)
                || session.force_hide == ForceHideState::Hidden;
            if refused {
                debug!("session {id} is not eligible for focus");
                return Err(WsError::DoNothing);
            }
            if session.force_hide == ForceHideState::HiddenWhenFocused {
                return Err(WsError::InvalidOperation);
            }

            let target = redirect_target(sessions, session);
            if reason != FocusChangeReason::ClientRequest {
                if let Some(holder) = sessions.get(&focused).filter(|f| f.id != target.id) {
                    let denied = check_click_focus_is_down_through_full_screen(holder, target, reason)
                        || check_focus_is_down_through_blocking_type(target, holder)
                        || (by_foreground && check_topmost_window_focus(holder, target));
                    if denied {
                        debug!("focus on {} denied: {} stays focused", target.id, holder.id);
                        return Err(WsError::DoNothing);
                    }
                }
            }
            Ok(target.id)
        })
    }

    fn unfocus_now(&self, id: SessionId, reason: FocusChangeReason) -> Result<(), WsError> {
        let _decision = self.decision.lock();
        let leaving = self.sessions.session(id).ok_or(WsError::DoNothing)?;
        self.unfocus(&leaving, reason)
    }

    /// Hands focus away from `leaving` if it holds it.  `leaving` may be a
    /// snapshot of a session that is already gone.
    fn unfocus(&self, leaving: &SessionEntity, reason: FocusChangeReason) -> Result<(), WsError> {
        let _decision = self.decision.lock();
        let (group_id, group, display_groups) = {
            let state = self.state.lock();
            let Some(group) = state
                .groups
                .values()
                .find(|g| g.focused_session_id == leaving.id)
            else {
                return Err(WsError::DoNothing);
            };
            (group.display_group, group.clone(), state.display_groups.clone())
        };

        let replacement = self.sessions.with_sessions(|sessions| {
            let in_group = |s: &SessionEntity| {
                display_groups
                    .get(&s.display_id)
                    .copied()
                    .unwrap_or(DisplayGroupId::DEFAULT)
                    == group_id
            };
            let eligible =
                |s: &SessionEntity| s.id != leaving.id && in_group(s) && is_focus_candidate(s);
            let best = highest_z(sessions.values().filter(|s| {
                eligible(s) && (s.parent_id == Some(leaving.id) || s.z_order < leaving.z_order)
            }));
            let chosen = best.or_else(|| {
                [group.last_focused_session_id, group.last_focused_app_session_id]
                    .iter()
                    .filter_map(|id| sessions.get(id))
                    .find(|s| eligible(s))
            });
            chosen
                .map(|s| redirect_target(sessions, s).id)
                .unwrap_or(SessionId::INVALID)
        });
        self.shift_focus_in(group_id, replacement, Some(leaving.clone()), reason)
    }

    /// The single mutation path.  `previous` is a snapshot of the outgoing
    /// holder when it no longer resolves through the registry.
    fn shift_focus_in(
        &self,
        group_id: DisplayGroupId,
        next: SessionId,
        previous: Option<SessionEntity>,
        reason: FocusChangeReason,
    ) -> Result<(), WsError> {
        let _decision = self.decision.lock();
        let next_session = if next.is_valid() {
            Some(self.sessions.session(next).ok_or(WsError::InvalidSession(next))?)
        } else {
            None
        };

        let events = {
            let mut state = self.state.lock();
            let group = state.group_mut(group_id);
            let prev_id = group.focused_session_id;
            if prev_id == next {
                return Err(WsError::DoNothing);
            }
            let prev = match previous {
                Some(p) if p.id == prev_id => Some(p),
                _ => self.sessions.session(prev_id),
            };
            self.swap_focused_flags(prev_id, next)?;
            group.record_shift(next, prev.as_ref());
            info!("focus {prev_id} -> {next} in {group_id} ({reason:?})");

            let withheld = if group.block_notify_until_foreground {
                if reason == FocusChangeReason::Foreground {
                    group.block_notify_until_foreground = false;
                    false
                } else {
                    true
                }
            } else {
                false
            };
            let mut events = Vec::with_capacity(2);
            if let Some(prev) = &prev {
                if group.block_notify_unfocus {
                    group.block_notify_unfocus = false;
                    debug!("unfocus notification for {prev_id} withheld");
                } else if !withheld {
                    events.push(FocusChangeEvent::Unfocused(change_info(prev, group_id, reason)));
                }
            }
            if let Some(next) = &next_session {
                if !withheld {
                    events.push(FocusChangeEvent::Focused(change_info(next, group_id, reason)));
                }
            }
            events
        };
        for event in &events {
            self.listeners.notify(event);
        }
        Ok(())
    }

    /// Flags `next` before clearing `prev_id`.  If `next` vanished in the
    /// meantime the previous holder keeps its flag and the group is untouched.
    fn swap_focused_flags(&self, prev_id: SessionId, next: SessionId) -> Result<(), WsError> {
        if next.is_valid() {
            self.sessions.set_focused(next, true)?;
        }
        if prev_id.is_valid() {
            if let Err(e) = self.sessions.set_focused(prev_id, false) {
                debug!("previous focus holder {prev_id} already gone: {e}");
            }
        }
        Ok(())
    }

    fn on_lifecycle(&self, event: SessionLifecycleEvent) {
        let outcome = match &event {
            SessionLifecycleEvent::Foreground(id) => self.request_session_focus_immediately(*id),
            SessionLifecycleEvent::Background(id) => match self.sessions.session(*id) {
                Some(s) => self.unfocus(&s, FocusChangeReason::Background),
                None => Err(WsError::DoNothing),
            },
            SessionLifecycleEvent::FocusEligibilityLost(id) => match self.sessions.session(*id) {
                Some(s) => self.unfocus(&s, FocusChangeReason::EligibilityLost),
                None => Err(WsError::DoNothing),
            },
            SessionLifecycleEvent::Destroyed(snapshot) => {
                let _decision = self.decision.lock();
                let outcome = self.unfocus(snapshot, FocusChangeReason::SessionDestroyed);
                for group in self.state.lock().groups.values_mut() {
                    group.forget(snapshot.id);
                }
                outcome
            }
        };
        if let Err(e) = outcome {
            debug!("{event:?}: focus unchanged ({e})");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session_persistence::SessionStateStore;
    use crate::infrastructure::storage::kv_store::MemoryStore;
    use wms_core::{ImmediateTaskQueue, SessionInfo, SessionProperty, WindowType};

    struct Fixture {
        registry: Arc<SessionRegistry>,
        arbiter: Arc<FocusArbiter>,
        events: Arc<Mutex<Vec<FocusChangeEvent>>>,
    }

    fn setup() -> Fixture {
        let queue = ImmediateTaskQueue::new();
        let registry = SessionRegistry::new(
            queue.clone(),
            SessionStateStore::new(Arc::new(MemoryStore::new())),
            Duration::from_millis(10),
        );
        let arbiter = FocusArbiter::new(Arc::clone(&registry), queue, Duration::from_millis(500));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        arbiter
            .focus_listeners()
            .subscribe(Arc::new(move |e: &FocusChangeEvent| sink.lock().push(*e)));
        Fixture {
            registry,
            arbiter,
            events,
        }
    }

    impl Fixture {
        fn create(&self, info: SessionInfo, z: u32) -> SessionId {
            let id = self.registry.create_session(info, None).unwrap();
            self.registry.update_property(id, SessionProperty::ZOrder(z)).unwrap();
            id
        }

        /// A foreground main window on display 0.
        fn window(&self, name: &str, z: u32) -> SessionId {
            let id = self.create(SessionInfo::new(name, WindowType::AppMainWindow, ScreenId(0)), z);
            self.registry.foreground(id).unwrap();
            id
        }

        fn dialog(&self, name: &str, parent: SessionId, z: u32) -> SessionId {
            let mut info = SessionInfo::new(name, WindowType::Dialog, ScreenId(0));
            info.parent_id = Some(parent);
            let id = self.create(info, z);
            self.registry.foreground(id).unwrap();
            id
        }

        fn focused(&self) -> SessionId {
            self.arbiter.get_focused_session_id(ScreenId(0))
        }

        fn focused_count(&self) -> usize {
            self.registry
                .with_sessions(|s| s.values().filter(|s| s.is_focused).count())
        }
    }

    fn focused_ids(events: &[FocusChangeEvent]) -> Vec<SessionId> {
        events
            .iter()
            .filter_map(|e| match e {
                FocusChangeEvent::Focused(info) => Some(info.session_id),
                FocusChangeEvent::Unfocused(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_foreground_session_takes_focus() {
        // Arrange
        let f = setup();

        // Act
        let a = f.window("a", 10);

        // Assert
        assert_eq!(f.focused(), a);
        assert!(f.registry.session(a).unwrap().is_focused);
    }

    #[test]
    fn test_dialog_outranks_its_parent() {
        // Arrange
        let f = setup();
        let parent = f.window("parent", 10);
        let dialog = f.dialog("dialog", parent, 11);
        let other = f.window("other", 20);
        assert_eq!(f.focused(), other);

        // Act
        let result = f
            .arbiter
            .request_session_focus(parent, false, FocusChangeReason::ClientRequest);

        // Assert
        assert_eq!(result, Ok(()));
        assert_eq!(f.focused(), dialog);
        assert!(!f.registry.session(parent).unwrap().is_focused);
    }

    #[test]
    fn test_highest_z_eligible_dialog_wins() {
        let f = setup();
        let parent = f.window("parent", 10);
        let low = f.dialog("low", parent, 12);
        let high = f.dialog("high", parent, 15);
        let hidden = f.dialog("hidden", parent, 30);
        f.registry.update_property(hidden, SessionProperty::Visible(false)).unwrap();
        f.window("other", 40);

        f.arbiter
            .request_session_focus(parent, false, FocusChangeReason::ClientRequest)
            .unwrap();

        assert_eq!(f.focused(), high);
        assert_ne!(f.focused(), low);
    }

    #[test]
    fn test_unfocus_moves_to_next_highest_eligible_session() {
        // Arrange
        let f = setup();
        let b = f.window("b", 50);
        let invisible = f.window("invisible", 80);
        f.registry
            .update_property(invisible, SessionProperty::Visible(false))
            .unwrap();
        let background = f.window("background", 70);
        f.registry.background(background).unwrap();
        let a = f.window("a", 100);
        assert_eq!(f.focused(), a);

        // Act
        let result = f.arbiter.request_session_unfocus(a, FocusChangeReason::ClientRequest);

        // Assert
        assert_eq!(result, Ok(()));
        assert_eq!(f.focused(), b);
        assert_eq!(f.focused_count(), 1);
    }

    #[test]
    fn test_unfocus_of_unfocused_session_does_nothing() {
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 20);
        assert_eq!(f.focused(), b);

        assert_eq!(
            f.arbiter.request_session_unfocus(a, FocusChangeReason::ClientRequest),
            Err(WsError::DoNothing)
        );
        assert_eq!(f.focused(), b);
    }

    #[test]
    fn test_unfocus_falls_back_to_last_focused() {
        // Arrange: a sits above b, but b took focus last
        let f = setup();
        let a = f.window("a", 50);
        let b = f.window("b", 10);
        assert_eq!(f.focused(), b);
        assert_eq!(f.arbiter.focus_group_snapshot(ScreenId(0)).last_focused_session_id, a);

        // Act
        f.arbiter
            .request_session_unfocus(b, FocusChangeReason::ClientRequest)
            .unwrap();

        // Assert
        assert_eq!(f.focused(), a);
    }

    #[test]
    fn test_unfocus_with_no_candidate_leaves_nothing_focused() {
        let f = setup();
        let a = f.window("a", 10);

        f.arbiter
            .request_session_unfocus(a, FocusChangeReason::ClientRequest)
            .unwrap();

        assert_eq!(f.focused(), SessionId::INVALID);
        assert_eq!(f.focused_count(), 0);
    }

    #[test]
    fn test_ineligible_requests_do_nothing() {
        let f = setup();
        let a = f.window("a", 10);
        f.registry.update_property(a, SessionProperty::Visible(false)).unwrap();
        let created = f.create(SessionInfo::new("c", WindowType::AppMainWindow, ScreenId(0)), 5);

        for id in [a, created, SessionId(999)] {
            assert_eq!(
                f.arbiter
                    .request_session_focus(id, false, FocusChangeReason::ClientRequest),
                Err(WsError::DoNothing)
            );
        }
    }

    #[test]
    fn test_focusable_on_show_only_gates_foreground_requests() {
        let f = setup();
        let a = f.create(SessionInfo::new("a", WindowType::AppMainWindow, ScreenId(0)), 10);
        f.registry
            .update_property(a, SessionProperty::FocusableOnShow(false))
            .unwrap();
        f.registry.foreground(a).unwrap();
        assert_eq!(f.focused(), SessionId::INVALID);

        assert_eq!(
            f.arbiter
                .request_session_focus(a, false, FocusChangeReason::ClientRequest),
            Ok(())
        );
    }

    #[test]
    fn test_hidden_when_focused_is_invalid_operation_but_immediate_does_nothing() {
        // Arrange
        let f = setup();
        let a = f.create(SessionInfo::new("a", WindowType::AppMainWindow, ScreenId(0)), 10);
        f.registry
            .update_property(a, SessionProperty::ForceHide(ForceHideState::HiddenWhenFocused))
            .unwrap();
        f.registry.foreground(a).unwrap();

        // Act / Assert
        assert_eq!(
            f.arbiter
                .request_session_focus(a, false, FocusChangeReason::ClientRequest),
            Err(WsError::InvalidOperation)
        );
        assert_eq!(
            f.arbiter.request_session_focus_immediately(a),
            Err(WsError::DoNothing)
        );
        assert_eq!(f.focused(), SessionId::INVALID);
    }

    #[test]
    fn test_shift_emits_exactly_one_unfocus_focus_pair() {
        // Arrange
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 5);
        f.events.lock().clear();

        // Act
        f.arbiter
            .request_session_focus(a, false, FocusChangeReason::ClientRequest)
            .unwrap();

        // Assert
        let events = f.events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FocusChangeEvent::Unfocused(i) if i.session_id == b));
        assert!(matches!(events[1], FocusChangeEvent::Focused(i) if i.session_id == a
            && i.reason == FocusChangeReason::ClientRequest));
    }

    #[test]
    fn test_blocking_fullscreen_swallows_clicks_below_it() {
        // Arrange
        let f = setup();
        let full = f.window("fullscreen", 100);
        f.registry
            .update_property(full, SessionProperty::BlockingFocus(true))
            .unwrap();
        let target = f.window("target", 50);

        // Assert: the foreground transition of target could not take focus
        assert_eq!(f.focused(), full);
        assert!(f
            .arbiter
            .check_click_focus_is_down_through_full_screen(full, target, FocusChangeReason::Click));
        assert_eq!(
            f.arbiter.request_session_focus(target, false, FocusChangeReason::Click),
            Err(WsError::DoNothing)
        );

        // Act: raised above the blocking window, the click goes through
        f.registry.update_property(target, SessionProperty::ZOrder(150)).unwrap();

        // Assert
        assert!(!f
            .arbiter
            .check_click_focus_is_down_through_full_screen(full, target, FocusChangeReason::Click));
        assert_eq!(
            f.arbiter.request_session_focus(target, false, FocusChangeReason::Click),
            Ok(())
        );
    }

    #[test]
    fn test_client_request_ignores_blocking_rules() {
        let f = setup();
        let full = f.window("fullscreen", 100);
        f.registry
            .update_property(full, SessionProperty::BlockingFocus(true))
            .unwrap();
        let target = f.window("target", 50);

        assert_eq!(
            f.arbiter
                .request_session_focus(target, false, FocusChangeReason::ClientRequest),
            Ok(())
        );
        assert_eq!(f.focused(), target);
    }

    #[test]
    fn test_topmost_main_window_keeps_focus_over_foreground_app() {
        let f = setup();
        let topmost = f.create(SessionInfo::new("top", WindowType::AppMainWindow, ScreenId(0)), 10);
        f.registry.update_property(topmost, SessionProperty::Topmost(true)).unwrap();
        f.registry.foreground(topmost).unwrap();

        f.window("app", 20);

        assert_eq!(f.focused(), topmost);
    }

    #[test]
    fn test_destroying_focused_session_hands_focus_off() {
        // Arrange
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 20);
        assert_eq!(f.focused(), b);

        // Act
        f.registry.destroy_session(b).unwrap();

        // Assert
        assert_eq!(f.focused(), a);
        let group = f.arbiter.focus_group_snapshot(ScreenId(0));
        assert_ne!(group.last_focused_session_id, b);
        assert_ne!(group.last_focused_app_session_id, b);
        assert!(matches!(
            f.events.lock().iter().rev().nth(1),
            Some(FocusChangeEvent::Unfocused(i)) if i.session_id == b
                && i.reason == FocusChangeReason::SessionDestroyed
        ));
    }

    #[test]
    fn test_background_and_eligibility_loss_release_focus() {
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 20);

        f.registry.background(b).unwrap();
        assert_eq!(f.focused(), a);

        f.registry
            .update_property(a, SessionProperty::ForceHide(ForceHideState::Hidden))
            .unwrap();
        assert_eq!(f.focused(), SessionId::INVALID);
        assert_eq!(f.focused_count(), 0);
    }

    #[test]
    fn test_focus_stays_singular_through_a_burst_of_transitions() {
        let f = setup();
        let ids: Vec<SessionId> = (0..6).map(|i| f.window(&format!("w{i}"), 10 * i + 1)).collect();

        for (n, id) in ids.iter().enumerate() {
            if n % 2 == 0 {
                f.registry.background(*id).unwrap();
            } else {
                let _ = f
                    .arbiter
                    .request_session_focus(*id, false, FocusChangeReason::ClientRequest);
            }
            assert!(f.focused_count() <= 1);
        }
        f.registry.destroy_session(ids[5]).unwrap();
        assert_eq!(f.focused_count(), 1);
    }

    #[test]
    fn test_notifications_withheld_until_foreground_change() {
        // Arrange
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 5);
        f.arbiter.set_notify_suppression(ScreenId(0), true, false);
        f.events.lock().clear();

        // Act: client request is silent
        f.arbiter
            .request_session_focus(a, false, FocusChangeReason::ClientRequest)
            .unwrap();
        assert!(f.events.lock().is_empty());
        assert_eq!(f.focused(), a);

        // Act: a foreground-caused change notifies and clears the flag
        f.registry.background(b).unwrap();
        f.registry.foreground(b).unwrap();

        // Assert
        assert_eq!(focused_ids(&f.events.lock()), vec![b]);
        assert!(!f.arbiter.focus_group_snapshot(ScreenId(0)).block_notify_until_foreground);
    }

    #[test]
    fn test_block_unfocus_withholds_only_the_next_unfocus() {
        let f = setup();
        let a = f.window("a", 10);
        let b = f.window("b", 5);
        f.arbiter.set_notify_suppression(ScreenId(0), false, true);
        f.events.lock().clear();

        f.arbiter
            .request_session_focus(a, false, FocusChangeReason::ClientRequest)
            .unwrap();
        f.arbiter
            .request_session_focus(b, false, FocusChangeReason::ClientRequest)
            .unwrap();

        let events = f.events.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], FocusChangeEvent::Focused(i) if i.session_id == a));
        assert!(matches!(events[1], FocusChangeEvent::Unfocused(i) if i.session_id == a));
    }

    #[test]
    fn test_each_focus_group_has_its_own_holder() {
        // Arrange
        let f = setup();
        let group = f.arbiter.add_focus_group(ScreenId(1));
        assert_eq!(f.arbiter.add_focus_group(ScreenId(1)), group);
        let main = f.window("main", 10);
        let ext = f.create(SessionInfo::new("ext", WindowType::AppMainWindow, ScreenId(1)), 10);

        // Act
        f.registry.foreground(ext).unwrap();

        // Assert
        assert_eq!(f.arbiter.get_focused_session_id(ScreenId(0)), main);
        assert_eq!(f.arbiter.get_focused_session_id(ScreenId(1)), ext);
        assert_eq!(f.arbiter.group_of(ScreenId(7)), DisplayGroupId::DEFAULT);
    }

    #[test]
    fn test_removing_focus_group_unfocuses_its_holder() {
        let f = setup();
        f.arbiter.add_focus_group(ScreenId(1));
        let ext = f.create(SessionInfo::new("ext", WindowType::AppMainWindow, ScreenId(1)), 10);
        f.registry.foreground(ext).unwrap();

        assert!(f.arbiter.remove_focus_group(ScreenId(1)));
        assert!(!f.arbiter.remove_focus_group(ScreenId(1)));

        assert!(!f.registry.session(ext).unwrap().is_focused);
        assert_eq!(f.arbiter.get_focused_session_id(ScreenId(1)), SessionId::INVALID);
    }

    #[test]
    fn test_vanished_target_leaves_previous_holder_focused() {
        // Arrange
        let f = setup();
        let gone = f.window("gone", 10);
        let holder = f.window("holder", 20);
        assert_eq!(f.focused(), holder);
        f.registry.destroy_session(gone).unwrap();

        // Act: the target disappears between resolution and the flag swap
        let result = f.arbiter.swap_focused_flags(holder, gone);

        // Assert
        assert_eq!(result, Err(WsError::InvalidSession(gone)));
        assert_eq!(f.focused(), holder);
        assert!(f.registry.session(holder).unwrap().is_focused);
        assert_eq!(f.focused_count(), 1);
    }

    #[test]
    fn test_notify_suppression_waits_for_pending_decision() {
        // Arrange
        let f = setup();
        let arbiter = Arc::clone(&f.arbiter);
        let decision = f.arbiter.decision.lock();

        // Act
        let writer = std::thread::spawn(move || {
            arbiter.set_notify_suppression(ScreenId(0), true, false);
        });
        std::thread::sleep(Duration::from_millis(50));

        // Assert: nothing lands while a decision is in progress
        assert!(!f.arbiter.focus_group_snapshot(ScreenId(0)).block_notify_until_foreground);
        drop(decision);
        writer.join().unwrap();
        assert!(f.arbiter.focus_group_snapshot(ScreenId(0)).block_notify_until_foreground);
    }

    #[test]
    fn test_shift_focus_to_unknown_session_is_invalid() {
        let f = setup();
        assert_eq!(
            f.arbiter.shift_focus(SessionId(42), FocusChangeReason::Default),
            Err(WsError::InvalidSession(SessionId(42)))
        );
    }
}
