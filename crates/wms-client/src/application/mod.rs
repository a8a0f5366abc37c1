//! Client-facing adapters, one per remote service.
//!
//! Each adapter mirrors its service trait from `wms_core::protocol::service`
//! method for method, adding only the "not reachable" sentinel.

pub mod display_manager;
pub mod session_manager;
