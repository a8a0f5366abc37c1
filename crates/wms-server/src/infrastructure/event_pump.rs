//! Tokio pumps that move backend and sensor events onto the screen queue.
//!
//! ```text
//! RenderBackend ──BackendScreenEvent──► spawn_screen_event_pump ──post──► ScreenRegistry
//! stdin / sensor ──SensorRotation─────► spawn_sensor_pump ───────post──► ScreenRotationResolver
//! ```
//!
//! Registries are synchronous and owned by serial queues, so a pump never
//! calls them directly from the async runtime: it posts a task and goes back
//! to waiting on its channel.  A pump ends when its sender side is dropped.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wms_core::{SensorRotation, TaskQueue};

use crate::application::rotation_resolver::ScreenRotationResolver;
use crate::application::screen_registry::ScreenRegistry;
use crate::infrastructure::backend::BackendScreenEvent;

/// Forwards every backend connection event to
/// [`ScreenRegistry::on_screen_change`] on `queue`.
pub fn spawn_screen_event_pump(
    mut rx: UnboundedReceiver<BackendScreenEvent>,
    screens: Arc<ScreenRegistry>,
    queue: Arc<dyn TaskQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!("backend event {:?} for {}", event.event, event.backend_id);
            let screens = Arc::clone(&screens);
            queue.post(Box::new(move || {
                screens.on_screen_change(event.backend_id, event.event);
            }));
        }
        info!("screen event pump stopped");
    })
}

/// Forwards sensor readings to [`ScreenRotationResolver::handle_sensor_rotation`]
/// on `queue`.  Invalid readings are dropped here.
pub fn spawn_sensor_pump(
    mut rx: UnboundedReceiver<SensorRotation>,
    resolver: Arc<ScreenRotationResolver>,
    queue: Arc<dyn TaskQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(reading) = rx.recv().await {
            if reading == SensorRotation::Invalid {
                debug!("invalid sensor reading dropped");
                continue;
            }
            let resolver = Arc::clone(&resolver);
            queue.post(Box::new(move || {
                if resolver.handle_sensor_rotation(reading) {
                    debug!("sensor reading {reading:?} rotated the default screen");
                }
            }));
        }
        info!("sensor pump stopped");
    })
}

/// Reads one reading in degrees per line (`0`, `90`, `180`, `270`) and sends
/// it to `tx`.  Unparseable lines are logged and skipped.  Returns how many
/// readings were sent once the reader hits end of input or the receiver
/// goes away.
pub async fn read_sensor_lines<R>(reader: R, tx: UnboundedSender<SensorRotation>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("sensor input failed: {e}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reading = match trimmed.parse::<i32>() {
            Ok(degrees) => SensorRotation::from_degrees(degrees),
            Err(_) => {
                warn!("ignoring sensor line {trimmed:?}");
                continue;
            }
        };
        if reading == SensorRotation::Invalid {
            warn!("ignoring sensor reading of {trimmed} degrees");
            continue;
        }
        if tx.send(reading).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

// ── Tests ─────────────────────────────────────────────────────────────────────
