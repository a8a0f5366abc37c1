//! Application layer use cases for the window management service.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `wms_core::domain`) and the infrastructure (backend,
//! storage, transport).
//!
//! Use cases in this layer:
//!
//! - **Own the mutable state** of the service: screens, sessions and focus.
//! - **Depend on abstractions** (`RenderBackend`, `KeyValueStore`,
//!   `TaskQueue`) rather than concrete implementations, so tests can swap in
//!   the headless backend, an in-memory store and an immediate queue.
//! - **Contain no OS calls, no network I/O, no direct file system access**.
//!
//! # Sub-modules
//!
//! - **`screen_registry`**   – Logical screens, screen groups (mirror /
//!   expand), virtual screens and their owners, rotation and mode changes.
//!
//! - **`rotation_resolver`** – Turns sensor readings into a display rotation
//!   using the device's natural orientation and the configured offset.
//!
//! - **`session_registry`**  – Window sessions: lifecycle state machine,
//!   parent/child links, owner death and recovery, window info snapshots.
//!
//! - **`session_persistence`** – Per-session state kept for recovery.
//!
//! - **`dirty_tracker`**     – Debounces "window layout changed" so input
//!   routing gets one snapshot per burst of mutations.
//!
//! - **`focus_arbiter`**     – Decides which session holds focus in each
//!   display group.  Runs on its own serial queue.

pub mod dirty_tracker;
pub mod focus_arbiter;
pub mod rotation_resolver;
pub mod screen_registry;
pub mod session_persistence;
pub mod session_registry;
