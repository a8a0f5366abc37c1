//! Snapshot ("info") types handed to clients.
//!
//! These are plain values copied out of the registries.  A client holding one
//! never observes later mutations; it asks again (or listens for change
//! events) to refresh.

use serde::{Deserialize, Serialize};

use crate::domain::rotation::{DisplayOrientation, Orientation, Rotation};
use crate::domain::screen::{DisplayMode, ScreenType};
use crate::domain::screen_identity::ScreenId;

/// Screen-level snapshot: modes, rotation, grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub id: ScreenId,
    pub name: String,
    pub screen_type: ScreenType,
    pub modes: Vec<DisplayMode>,
    pub active_mode_idx: usize,
    pub rotation: Rotation,
    pub orientation: Orientation,
    pub virtual_pixel_ratio: f32,
    pub group_id: Option<ScreenId>,
    pub connected: bool,
}

/// Display-level snapshot: what an application needs to lay itself out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub display_id: ScreenId,
    pub screen_id: ScreenId,
    pub name: String,
    /// Width in physical pixels after rotation.
    pub width: u32,
    /// Height in physical pixels after rotation.
    pub height: u32,
    pub refresh_rate: u32,
    pub virtual_pixel_ratio: f32,
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub rotation: Rotation,
    pub display_orientation: DisplayOrientation,
    pub screen_type: ScreenType,
}

/// Parameters of a virtual screen creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualScreenOption {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density: f32,
    /// Opaque render surface handle owned by the requester, if any.
    pub surface: Option<u64>,
}

impl VirtualScreenOption {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            density: 1.0,
            surface: None,
        }
    }
}
