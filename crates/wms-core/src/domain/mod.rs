//! Domain layer: pure entities and rules with no OS or I/O dependencies.
//!
//! - **`screen_identity`** – logical ↔ backend screen id bijection.
//! - **`screen`** / **`screen_group`** – screens and their mirror/expand groups.
//! - **`rotation`** – sensor → device → display rotation tables.
//! - **`session`** – the window session entity and its state machine.
//! - **`hot_area`** – hit regions for input routing.
//! - **`focus`** – focus groups and the focus precedence rules.

pub mod focus;
pub mod geometry;
pub mod hot_area;
pub mod rotation;
pub mod screen;
pub mod screen_group;
pub mod screen_identity;
pub mod session;
