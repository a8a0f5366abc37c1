//! # wms-core
//!
//! Shared library for the window management service: domain entities,
//! protocol types and the concurrency primitives both the server and the
//! client library are built on.
//!
//! It has no dependencies on OS APIs, rendering backends or transports.
//!
//! # Architecture overview (for beginners)
//!
//! The service tracks every screen (physical or virtual display) and every
//! session (window), and decides which session holds input focus.  Clients
//! talk to it through an opaque request/response transport.
//!
//! - **`domain`** – Pure business rules.  Screen identities and groups,
//!   rotation tables, the session state machine, hot areas and the focus
//!   precedence rules.
//!
//! - **`protocol`** – What crosses the client/server boundary: typed error
//!   codes, info snapshots, event payloads and the two service traits.
//!
//! - **`runtime`** – Serial task queues (one per manager subsystem), the
//!   generic `Subject<E>` listener fan-out, and monitored peers with death
//!   recipients.

pub mod domain;
pub mod protocol;
pub mod runtime;

// Re-export the most-used types at the crate root so callers can write
// `wms_core::ScreenId` instead of `wms_core::domain::screen_identity::ScreenId`.
pub use domain::focus::{DisplayGroupId, FocusChangeReason, FocusGroup};
pub use domain::geometry::{Point, Rect};
pub use domain::rotation::{
    DeviceRotation, DisplayOrientation, NaturalOrientation, Orientation, Rotation,
    RotationMapping, SensorRotation,
};
pub use domain::screen::{DisplayMode, ScreenEntity, ScreenType};
pub use domain::screen_group::{CombinationMode, ScreenGroupEntity};
pub use domain::screen_identity::{BackendScreenId, ScreenId, ScreenIdentityMap};
pub use domain::session::{
    ForceHideState, SessionEntity, SessionId, SessionInfo, SessionProperty, SessionState,
    WindowMode, WindowType,
};
pub use protocol::errors::{DmError, WsError};
pub use protocol::info::{DisplayInfo, ScreenInfo, VirtualScreenOption};
pub use runtime::peer::PeerHandle;
pub use runtime::subject::{Listener, ListenerId, Subject};
pub use runtime::task_queue::{ImmediateTaskQueue, SerialTaskQueue, TaskQueue};
