//! Focus groups and the pure rules the focus arbiter applies.
//!
//! There is one [`FocusGroup`] per display group.  It records who holds focus
//! now, who held it last, and who was the last focused *main* window, plus two
//! notification suppression flags.  Everything in this module is a pure
//! function of session snapshots; the arbiter in the server crate decides when
//! to call them and serialises the resulting mutations.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::session::{ForceHideState, SessionEntity, SessionId};

/// Identifies a set of displays that share one focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayGroupId(pub u64);

impl DisplayGroupId {
    pub const DEFAULT: DisplayGroupId = DisplayGroupId(0);
}

impl fmt::Display for DisplayGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Why focus is changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FocusChangeReason {
    #[default]
    Default,
    /// The window's own client asked for it.
    ClientRequest,
    /// The session moved to the foreground.
    Foreground,
    /// The session moved to the background.
    Background,
    /// A pointer click landed on the session.
    Click,
    SessionDestroyed,
    /// The session became invisible, unfocusable or force-hidden.
    EligibilityLost,
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusGroup {
    pub display_group: DisplayGroupId,
    pub focused_session_id: SessionId,
    pub last_focused_session_id: SessionId,
    pub last_focused_app_session_id: SessionId,
    /// Withhold focus notifications until a foreground-caused focus change.
    pub block_notify_until_foreground: bool,
    /// Withhold the next unfocus notification.
    pub block_notify_unfocus: bool,
}

impl FocusGroup {
    pub fn new(display_group: DisplayGroupId) -> Self {
        Self {
            display_group,
            focused_session_id: SessionId::INVALID,
            last_focused_session_id: SessionId::INVALID,
            last_focused_app_session_id: SessionId::INVALID,
            block_notify_until_foreground: false,
            block_notify_unfocus: false,
        }
    }

    /// Moves focus to `next` and remembers the previous holder.  `previous`
    /// is the outgoing session's snapshot, if it still exists.
    pub fn record_shift(&mut self, next: SessionId, previous: Option<&SessionEntity>) {
        if let Some(prev) = previous {
            self.last_focused_session_id = prev.id;
            if prev.window_type.is_main() {
                self.last_focused_app_session_id = prev.id;
            }
        }
        self.focused_session_id = next;
    }

    /// Drops every reference to `id` (used when a session is destroyed).
    pub fn forget(&mut self, id: SessionId) {
        if self.last_focused_session_id == id {
            self.last_focused_session_id = SessionId::INVALID;
        }
        if self.last_focused_app_session_id == id {
            self.last_focused_app_session_id = SessionId::INVALID;
        }
    }
}

/// A session that could hold focus right now: foreground or active,
/// visible, focusable and not force-hidden.
pub fn is_focus_candidate(session: &SessionEntity) -> bool {
    session.is_foreground()
        && session.visible
        && session.focusable
        && session.force_hide == ForceHideState::NotHidden
}

/// A dialog or modal-topmost child that takes focus in place of its owner.
pub fn is_redirect_target(child: &SessionEntity) -> bool {
    is_focus_candidate(child) && child.focused_on_show
}

/// Picks the highest z-order session; ties go to the lower persistent id so
/// the result never depends on iteration order.
pub fn highest_z<'a, I>(candidates: I) -> Option<&'a SessionEntity>
where
    I: IntoIterator<Item = &'a SessionEntity>,
{
    candidates
        .into_iter()
        .max_by(|a, b| a.z_order.cmp(&b.z_order).then_with(|| b.id.cmp(&a.id)))
}

/// `true` means "deny": a click on `clicked` must not take focus away from a
/// blocking `focused` session that sits above it.
pub fn check_click_focus_is_down_through_full_screen(
    focused: &SessionEntity,
    clicked: &SessionEntity,
    reason: FocusChangeReason,
) -> bool {
    reason == FocusChangeReason::Click
        && focused.blocking_focus
        && focused.z_order > clicked.z_order
}

/// `true` when `focused` is a visible foreground blocking session above
/// `requester`, i.e. the request would push focus down through it.
pub fn check_focus_is_down_through_blocking_type(
    requester: &SessionEntity,
    focused: &SessionEntity,
) -> bool {
    focused.id != requester.id
        && focused.blocking_focus
        && focused.is_foreground()
        && focused.visible
        && focused.z_order > requester.z_order
}

/// `true` when `focused` is a topmost main window and `requester` is an
/// ordinary (non-topmost) main window.
pub fn check_topmost_window_focus(focused: &SessionEntity, requester: &SessionEntity) -> bool {
    focused.id != requester.id
        && focused.topmost
        && focused.window_type.is_main()
        && requester.window_type.is_main()
        && !requester.topmost
}

// ── Tests ─────────────────────────────────────────────────────────────────────
