//! ScreenRotationResolver: turns raw sensor readings into display rotations.
//!
//! ```text
//! SensorRotation ──(offset, natural orientation)──► DeviceRotation ──► Rotation
//!      0/90/180/270                                  PORTRAIT ...      0/90/180/270
//! ```
//!
//! The lookup tables depend on whether the default screen is naturally
//! portrait or landscape, so they are built lazily the first time a default
//! screen exists and then reused.  Only phone form factors follow the sensor;
//! on anything else (including an unknown form factor) every entry point is a
//! no-op.
//!
//! The resolver never rotates a screen itself: it hands the new rotation to
//! [`ScreenRegistry::sensor_rotation_change`], which decides whether the
//! screen currently follows the sensor.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use wms_core::{
    DeviceRotation, NaturalOrientation, Rotation, RotationMapping, ScreenId, SensorRotation,
};

use super::screen_registry::ScreenRegistry;

/// Form factor on which sensor rotation applies.
pub const PHONE_DEVICE_TYPE: &str = "phone";

#[derive(Default)]
struct ResolverState {
    mapping: Option<RotationMapping>,
    last_converted: Option<Rotation>,
}

pub struct ScreenRotationResolver {
    registry: Arc<ScreenRegistry>,
    device_type: Option<String>,
    offset_degrees: i32,
    state: Mutex<ResolverState>,
}

impl ScreenRotationResolver {
    /// `device_type` is the configured form factor; `offset_degrees` is how far
    /// the sensor is mounted from the panel's natural orientation.
    pub fn new(registry: Arc<ScreenRegistry>, device_type: Option<String>, offset_degrees: i32) -> Self {
        Self {
            registry,
            device_type,
            offset_degrees,
            state: Mutex::new(ResolverState::default()),
        }
    }

    fn applies(&self) -> bool {
        self.device_type.as_deref() == Some(PHONE_DEVICE_TYPE)
    }

    fn default_screen(&self) -> Option<(ScreenId, NaturalOrientation, Rotation)> {
        let id = self.registry.default_screen_id()?;
        let info = self.registry.screen_info(id).ok()?;
        let natural = info
            .modes
            .get(info.active_mode_idx)
            .map(|m| NaturalOrientation::from_size(m.width, m.height))
            .unwrap_or_default();
        Some((id, natural, info.rotation))
    }

    /// Returns the mapping tables, building them on first use.  Until a
    /// default screen exists a portrait mapping is returned but not cached.
    pub fn process_rotation_mapping(&self) -> RotationMapping {
        let mut state = self.state.lock();
        if let Some(mapping) = &state.mapping {
            return mapping.clone();
        }
        match self.default_screen() {
            Some((id, natural, _)) => {
                let mapping = RotationMapping::build(natural, self.offset_degrees);
                debug!("rotation mapping built from screen {id} ({natural:?})");
                state.mapping = Some(mapping.clone());
                mapping
            }
            None => RotationMapping::build(NaturalOrientation::Portrait, self.offset_degrees),
        }
    }

    pub fn calc_device_rotation(&self, sensor: SensorRotation) -> DeviceRotation {
        self.process_rotation_mapping().sensor_to_device(sensor)
    }

    /// Table lookup.  [`DeviceRotation::Invalid`] yields the default screen's
    /// current rotation (or the natural one when there is no screen), so this
    /// always has an answer.
    pub fn convert_device_to_display_rotation(&self, device: DeviceRotation) -> Rotation {
        let mapping = self.process_rotation_mapping();
        if let Some(rotation) = mapping.device_to_display(device) {
            return rotation;
        }
        match self.default_screen() {
            Some((_, _, current)) => current,
            None => mapping
                .device_to_display(mapping.natural_device_rotation())
                .unwrap_or(Rotation::Deg0),
        }
    }

    /// Pushes a new device rotation to the default screen.  Returns whether
    /// the screen's rotation changed.
    pub fn handle_sensor_event_input(&self, device: DeviceRotation) -> bool {
        if !self.applies() {
            debug!("sensor input ignored: device type {:?}", self.device_type);
            return false;
        }
        if device == DeviceRotation::Invalid {
            return false;
        }
        let Some((id, _, _)) = self.default_screen() else {
            debug!("sensor input ignored: no default screen");
            return false;
        };
        let rotation = self.convert_device_to_display_rotation(device);
        {
            let mut state = self.state.lock();
            if state.last_converted == Some(rotation) {
                return false;
            }
            state.last_converted = Some(rotation);
        }
        match self.registry.sensor_rotation_change(id, rotation) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("sensor rotation {rotation:?} not applied to screen {id}: {e}");
                false
            }
        }
    }

    /// Sensor-level entry point: device rotation first, then the display.
    pub fn handle_sensor_rotation(&self, sensor: SensorRotation) -> bool {
        let device = self.calc_device_rotation(sensor);
        self.handle_sensor_event_input(device)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
