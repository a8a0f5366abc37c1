//! wms-client library entry point.
//!
//! # What does wms-client do? (for beginners)
//!
//! Applications do not talk to the window management service directly.  They
//! go through two adapters:
//!
//! - [`application::display_manager::DisplayManagerAdapter`] for screens,
//!   displays, virtual screens and agent registration;
//! - [`application::session_manager::SessionManagerAdapter`] for window
//!   sessions and focus.
//!
//! Both sit on a [`infrastructure::proxy::ProxyAdapter`], which finds the
//! service through a directory, caches the handle and drops it when the
//! service process dies.  A call made while the service is unreachable
//! returns a "proxy not ready" value instead of blocking or retrying.

/// Application layer: the adapters applications call.
pub mod application;

/// Infrastructure layer: service lookup and proxy lifecycle.
pub mod infrastructure;
