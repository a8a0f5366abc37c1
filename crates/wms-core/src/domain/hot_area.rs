//! Hit regions ("hot areas") used by downstream input routing.
//!
//! A session with explicit touch hot areas uses those, deduplicated and capped
//! at [`MAX_HOT_AREA_COUNT`].  Otherwise a default hot zone is synthesised from
//! the session's own size: main windows and picture-in-picture windows get a
//! margin around their bounds (scaled by screen density) so that edge drags
//! land on them; every other window type uses its exact bounds.
//!
//! All rectangles are in window-local coordinates.

use tracing::warn;

use super::geometry::Rect;
use super::session::{SessionEntity, WindowType};

/// Upper bound on hot areas reported per session.
pub const MAX_HOT_AREA_COUNT: usize = 10;
/// Touch hot-zone margin in virtual pixels.
pub const HOTZONE_TOUCH: f32 = 24.0;
/// Pointer hot-zone margin in virtual pixels.
pub const HOTZONE_POINTER: f32 = 4.0;
/// Density assumed when the session's screen reports none.
pub const DEFAULT_DENSITY: f32 = 1.5;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HotAreas {
    pub touch: Vec<Rect>,
    pub pointer: Vec<Rect>,
}

fn has_default_hot_zone(window_type: WindowType) -> bool {
    matches!(window_type, WindowType::AppMainWindow | WindowType::Pip)
}

/// Computes the hot areas for `session` on a screen of `density` (virtual
/// pixel ratio).  A missing or non-positive density falls back to
/// [`DEFAULT_DENSITY`].
pub fn compute_hot_areas(session: &SessionEntity, density: Option<f32>) -> HotAreas {
    if !session.touch_hot_areas.is_empty() {
        let mut areas: Vec<Rect> = Vec::with_capacity(session.touch_hot_areas.len());
        for rect in &session.touch_hot_areas {
            if !areas.contains(rect) {
                areas.push(*rect);
            }
        }
        if areas.len() > MAX_HOT_AREA_COUNT {
            warn!(
                "session {} declares {} hot areas; keeping the first {MAX_HOT_AREA_COUNT}",
                session.id,
                areas.len()
            );
            areas.truncate(MAX_HOT_AREA_COUNT);
        }
        return HotAreas {
            touch: areas.clone(),
            pointer: areas,
        };
    }

    let bounds = Rect::new(0, 0, session.rect.width, session.rect.height);
    let (touch_margin, pointer_margin) = if has_default_hot_zone(session.window_type) {
        let vpr = density.filter(|d| *d > 0.0).unwrap_or(DEFAULT_DENSITY);
        ((HOTZONE_TOUCH * vpr) as u32, (HOTZONE_POINTER * vpr) as u32)
    } else {
        (0, 0)
    };
    HotAreas {
        touch: vec![bounds.inflate(touch_margin)],
        pointer: vec![bounds.inflate(pointer_margin)],
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::screen_identity::ScreenId;
    use crate::domain::session::{SessionId, SessionInfo};

    fn session(window_type: WindowType) -> SessionEntity {
        let mut info = SessionInfo::new("w", window_type, ScreenId(0));
        info.rect = Rect::new(100, 200, 400, 300);
        SessionEntity::from_info(SessionId(3), &info)
    }

    #[test]
    fn test_main_window_gets_density_scaled_margins() {
        let areas = compute_hot_areas(&session(WindowType::AppMainWindow), Some(2.0));
        assert_eq!(areas.touch, vec![Rect::new(-48, -48, 496, 396)]);
        assert_eq!(areas.pointer, vec![Rect::new(-8, -8, 416, 316)]);
    }

    #[test]
    fn test_missing_density_uses_default() {
        let areas = compute_hot_areas(&session(WindowType::Pip), None);
        assert_eq!(areas.touch, vec![Rect::new(-36, -36, 472, 372)]);
        assert_eq!(areas.pointer, vec![Rect::new(-6, -6, 412, 312)]);
    }

    #[test]
    fn test_other_window_types_use_exact_bounds() {
        let areas = compute_hot_areas(&session(WindowType::Dialog), Some(3.0));
        assert_eq!(areas.touch, vec![Rect::new(0, 0, 400, 300)]);
        assert_eq!(areas.pointer, areas.touch);
    }

    #[test]
    fn test_explicit_hot_areas_are_deduplicated() {
        let mut s = session(WindowType::AppMainWindow);
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 10, 10);
        s.touch_hot_areas = vec![a, b, a];

        let areas = compute_hot_areas(&s, Some(2.0));

        assert_eq!(areas.touch, vec![a, b]);
    }

    #[test]
    fn test_explicit_hot_areas_are_truncated_to_cap() {
        let mut s = session(WindowType::AppMainWindow);
        s.touch_hot_areas = (0..15).map(|i| Rect::new(i, 0, 5, 5)).collect();

        let areas = compute_hot_areas(&s, None);

        assert_eq!(areas.touch.len(), MAX_HOT_AREA_COUNT);
        assert_eq!(areas.touch[9], Rect::new(9, 0, 5, 5));
    }
}
