//! Screen entity: one physical or virtual display surface.
//!
//! A `ScreenEntity` is owned exclusively by the server's screen registry.  It
//! is mutated by rotation/orientation setters and backend mode-change
//! callbacks, and it produces the [`ScreenInfo`] / [`DisplayInfo`] snapshots
//! handed to clients.

use serde::{Deserialize, Serialize};

use super::rotation::{NaturalOrientation, Orientation, Rotation, RotationMapping};
use super::screen_identity::{BackendScreenId, ScreenId};
use crate::protocol::info::{DisplayInfo, ScreenInfo};

/// Ratios closer to zero than this are treated as "unset" (1.0).
const VPR_EPSILON: f32 = 1e-6;

/// Where a screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenType {
    Real,
    Virtual,
}

/// One supported display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
}

impl DisplayMode {
    pub fn new(width: u32, height: u32, refresh_rate: u32) -> Self {
        Self {
            width,
            height,
            refresh_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenEntity {
    pub id: ScreenId,
    pub backend_id: BackendScreenId,
    pub name: String,
    pub screen_type: ScreenType,
    pub modes: Vec<DisplayMode>,
    pub active_mode_idx: usize,
    pub rotation: Rotation,
    /// Orientation currently applied.
    pub orientation: Orientation,
    /// Last orientation explicitly requested for this screen.
    pub requested_orientation: Orientation,
    pub virtual_pixel_ratio: f32,
    pub group_id: Option<ScreenId>,
    pub connected: bool,
    pub rotation_locked: bool,
}

impl ScreenEntity {
    /// Builds a screen with mode 0 active, unrotated and not yet connected.
    pub fn new(
        id: ScreenId,
        backend_id: BackendScreenId,
        name: impl Into<String>,
        screen_type: ScreenType,
        modes: Vec<DisplayMode>,
        virtual_pixel_ratio: f32,
    ) -> Self {
        Self {
            id,
            backend_id,
            name: name.into(),
            screen_type,
            modes,
            active_mode_idx: 0,
            rotation: Rotation::Deg0,
            orientation: Orientation::Unspecified,
            requested_orientation: Orientation::Unspecified,
            virtual_pixel_ratio,
            group_id: None,
            connected: false,
            rotation_locked: false,
        }
    }

    pub fn active_mode(&self) -> Option<&DisplayMode> {
        self.modes.get(self.active_mode_idx)
    }

    /// Selects mode `idx`.  Returns `false` (and changes nothing) when out of range.
    pub fn set_active_mode(&mut self, idx: usize) -> bool {
        if idx >= self.modes.len() {
            return false;
        }
        self.active_mode_idx = idx;
        true
    }

    /// Portrait when the active mode is taller than wide; portrait as well when
    /// no mode is known.
    pub fn natural_orientation(&self) -> NaturalOrientation {
        self.active_mode()
            .map(|m| NaturalOrientation::from_size(m.width, m.height))
            .unwrap_or(NaturalOrientation::Portrait)
    }

    pub fn rotation_mapping(&self) -> RotationMapping {
        RotationMapping::build(self.natural_orientation(), 0)
    }

    /// Whether sensor-driven rotation applies to this screen right now.
    pub fn follows_sensor(&self) -> bool {
        !self.rotation_locked
            && matches!(
                self.requested_orientation,
                Orientation::Unspecified | Orientation::Sensor
            )
    }

    pub fn effective_pixel_ratio(&self) -> f32 {
        if self.virtual_pixel_ratio.abs() < VPR_EPSILON {
            1.0
        } else {
            self.virtual_pixel_ratio
        }
    }

    pub fn screen_info(&self) -> ScreenInfo {
        ScreenInfo {
            id: self.id,
            name: self.name.clone(),
            screen_type: self.screen_type,
            modes: self.modes.clone(),
            active_mode_idx: self.active_mode_idx,
            rotation: self.rotation,
            orientation: self.orientation,
            virtual_pixel_ratio: self.virtual_pixel_ratio,
            group_id: self.group_id,
            connected: self.connected,
        }
    }

    /// Snapshot of the display this screen backs.  Width and height follow the
    /// current rotation; virtual size is physical size over the pixel ratio.
    pub fn display_info(&self) -> DisplayInfo {
        let (mut width, mut height, refresh_rate) = self
            .active_mode()
            .map(|m| (m.width, m.height, m.refresh_rate))
            .unwrap_or((0, 0, 0));
        if self.rotation.is_quarter_turn() {
            std::mem::swap(&mut width, &mut height);
        }
        let vpr = self.effective_pixel_ratio();
        DisplayInfo {
            display_id: self.id,
            screen_id: self.id,
            name: self.name.clone(),
            width,
            height,
            refresh_rate,
            virtual_pixel_ratio: vpr,
            virtual_width: (width as f32 / vpr) as u32,
            virtual_height: (height as f32 / vpr) as u32,
            rotation: self.rotation,
            display_orientation: self.rotation_mapping().display_orientation(self.rotation),
            screen_type: self.screen_type,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
