//! Rotation and orientation tables.
//!
//! Three representations of "which way up" are in play:
//!
//! ```text
//! SensorRotation ──calc_device_rotation──► DeviceRotation ──table──► Rotation ──table──► DisplayOrientation
//!  (raw 0/90/180/270)                      (portrait/landscape…)     (0/90/180/270)      (what apps see)
//! ```
//!
//! The tables depend on one bit of device knowledge: whether the default
//! screen's natural (unrotated) mode is portrait (`width < height`) or
//! landscape.  A landscape-natural device has its physical axes turned 90°
//! relative to a portrait-natural one, so its device rotations pair with
//! display rotations the other way round.
//!
//! [`RotationMapping`] is a pure value: building it twice from the same inputs
//! yields equal tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Display rotation applied to a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// `true` for 90° and 270°, where width and height swap.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Raw reading delivered by the rotation sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorRotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
    Invalid,
}

impl SensorRotation {
    pub const VALID: [SensorRotation; 4] = [
        SensorRotation::Deg0,
        SensorRotation::Deg90,
        SensorRotation::Deg180,
        SensorRotation::Deg270,
    ];

    fn index(self) -> Option<i32> {
        match self {
            SensorRotation::Deg0 => Some(0),
            SensorRotation::Deg90 => Some(1),
            SensorRotation::Deg180 => Some(2),
            SensorRotation::Deg270 => Some(3),
            SensorRotation::Invalid => None,
        }
    }

    /// Maps a degree reading to the nearest valid value; anything that is not
    /// a multiple of 90 is `Invalid`.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            0 => SensorRotation::Deg0,
            90 => SensorRotation::Deg90,
            180 => SensorRotation::Deg180,
            270 => SensorRotation::Deg270,
            _ => SensorRotation::Invalid,
        }
    }
}

/// How the physical device is being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRotation {
    Portrait,
    Landscape,
    PortraitInverted,
    LandscapeInverted,
    Invalid,
}

impl DeviceRotation {
    pub const VALID: [DeviceRotation; 4] = [
        DeviceRotation::Portrait,
        DeviceRotation::Landscape,
        DeviceRotation::PortraitInverted,
        DeviceRotation::LandscapeInverted,
    ];

    fn from_index(index: i32) -> Self {
        match index {
            0 => DeviceRotation::Portrait,
            1 => DeviceRotation::Landscape,
            2 => DeviceRotation::PortraitInverted,
            3 => DeviceRotation::LandscapeInverted,
            _ => DeviceRotation::Invalid,
        }
    }
}

/// Orientation reported to applications for a given display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayOrientation {
    Portrait,
    Landscape,
    PortraitInverted,
    LandscapeInverted,
    #[default]
    Unknown,
}

/// Orientation requested for a screen, by a window or by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Unspecified,
    Vertical,
    Horizontal,
    ReverseVertical,
    ReverseHorizontal,
    /// Follow the rotation sensor.
    Sensor,
}

impl Orientation {
    /// The display orientation this request pins the screen to, if any.
    pub fn target_display_orientation(self) -> Option<DisplayOrientation> {
        match self {
            Orientation::Vertical => Some(DisplayOrientation::Portrait),
            Orientation::Horizontal => Some(DisplayOrientation::Landscape),
            Orientation::ReverseVertical => Some(DisplayOrientation::PortraitInverted),
            Orientation::ReverseHorizontal => Some(DisplayOrientation::LandscapeInverted),
            Orientation::Unspecified | Orientation::Sensor => None,
        }
    }

    /// Stable name used by the persisted key-value store.
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Unspecified => "unspecified",
            Orientation::Vertical => "vertical",
            Orientation::Horizontal => "horizontal",
            Orientation::ReverseVertical => "reverse_vertical",
            Orientation::ReverseHorizontal => "reverse_horizontal",
            Orientation::Sensor => "sensor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "unspecified" => Orientation::Unspecified,
            "vertical" => Orientation::Vertical,
            "horizontal" => Orientation::Horizontal,
            "reverse_vertical" => Orientation::ReverseVertical,
            "reverse_horizontal" => Orientation::ReverseHorizontal,
            "sensor" => Orientation::Sensor,
            _ => return None,
        })
    }
}

/// Whether a screen's unrotated mode is taller than it is wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NaturalOrientation {
    #[default]
    Portrait,
    Landscape,
}

impl NaturalOrientation {
    /// `width < height` is portrait; a square panel counts as landscape.
    pub fn from_size(width: u32, height: u32) -> Self {
        if width < height {
            NaturalOrientation::Portrait
        } else {
            NaturalOrientation::Landscape
        }
    }
}

/// Converts a sensor reading into a device rotation.
///
/// Subtracts the device's mounting offset in quarter turns, normalises into
/// `0..=3`, and for landscape-natural devices shifts by one quarter turn with
/// the 0°/180° and 90°/270° pairs swapped.
pub fn calc_device_rotation(
    sensor: SensorRotation,
    offset_degrees: i32,
    natural: NaturalOrientation,
) -> DeviceRotation {
    let Some(index) = sensor.index() else {
        return DeviceRotation::Invalid;
    };
    let bias = offset_degrees / 90;
    let mut value = (index - bias).rem_euclid(4);
    if natural == NaturalOrientation::Landscape {
        value += 1;
        if value % 2 == 0 {
            value -= 2;
        }
    }
    DeviceRotation::from_index(value)
}

/// The three lookup tables derived from a device's natural orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMapping {
    natural: NaturalOrientation,
    sensor_to_device: HashMap<SensorRotation, DeviceRotation>,
    device_to_display: HashMap<DeviceRotation, Rotation>,
    display_to_orientation: HashMap<Rotation, DisplayOrientation>,
}

impl RotationMapping {
    pub fn build(natural: NaturalOrientation, offset_degrees: i32) -> Self {
        let portrait = natural == NaturalOrientation::Portrait;
        let pick = |when_natural: Rotation, otherwise: Rotation, matches: bool| {
            if matches {
                when_natural
            } else {
                otherwise
            }
        };

        let sensor_to_device = SensorRotation::VALID
            .iter()
            .chain(std::iter::once(&SensorRotation::Invalid))
            .map(|&s| (s, calc_device_rotation(s, offset_degrees, natural)))
            .collect();

        let device_to_display = HashMap::from([
            (DeviceRotation::Portrait, pick(Rotation::Deg0, Rotation::Deg90, portrait)),
            (DeviceRotation::Landscape, pick(Rotation::Deg0, Rotation::Deg90, !portrait)),
            (DeviceRotation::PortraitInverted, pick(Rotation::Deg180, Rotation::Deg270, portrait)),
            (DeviceRotation::LandscapeInverted, pick(Rotation::Deg180, Rotation::Deg270, !portrait)),
        ]);

        let display_to_orientation = if portrait {
            HashMap::from([
                (Rotation::Deg0, DisplayOrientation::Portrait),
                (Rotation::Deg90, DisplayOrientation::Landscape),
                (Rotation::Deg180, DisplayOrientation::PortraitInverted),
                (Rotation::Deg270, DisplayOrientation::LandscapeInverted),
            ])
        } else {
            HashMap::from([
                (Rotation::Deg0, DisplayOrientation::Landscape),
                (Rotation::Deg90, DisplayOrientation::Portrait),
                (Rotation::Deg180, DisplayOrientation::LandscapeInverted),
                (Rotation::Deg270, DisplayOrientation::PortraitInverted),
            ])
        };

        Self {
            natural,
            sensor_to_device,
            device_to_display,
            display_to_orientation,
        }
    }

    pub fn natural(&self) -> NaturalOrientation {
        self.natural
    }

    pub fn sensor_to_device(&self, sensor: SensorRotation) -> DeviceRotation {
        self.sensor_to_device
            .get(&sensor)
            .copied()
            .unwrap_or(DeviceRotation::Invalid)
    }

    /// `None` only for [`DeviceRotation::Invalid`].
    pub fn device_to_display(&self, device: DeviceRotation) -> Option<Rotation> {
        self.device_to_display.get(&device).copied()
    }

    pub fn display_orientation(&self, rotation: Rotation) -> DisplayOrientation {
        self.display_to_orientation
            .get(&rotation)
            .copied()
            .unwrap_or_default()
    }

    /// Rotation that puts the screen into the orientation `requested` pins,
    /// or `None` when the request does not pin one (unspecified / sensor).
    pub fn orientation_to_rotation(&self, requested: Orientation) -> Option<Rotation> {
        let target = requested.target_display_orientation()?;
        Rotation::ALL
            .into_iter()
            .find(|r| self.display_orientation(*r) == target)
    }

    /// The device rotation that corresponds to holding the device naturally.
    pub fn natural_device_rotation(&self) -> DeviceRotation {
        match self.natural {
            NaturalOrientation::Portrait => DeviceRotation::Portrait,
            NaturalOrientation::Landscape => DeviceRotation::Landscape,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
