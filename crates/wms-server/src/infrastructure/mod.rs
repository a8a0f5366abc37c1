//! Infrastructure layer for the window management service.
//!
//! Contains the adapters around the application layer: the rendering
//! backend, tokio event pumps, file-system storage, and the RPC facade that
//! clients talk to.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `wms_core`.  The application layer only sees the traits declared here
//! (`RenderBackend`, `KeyValueStore`), never the concrete adapters.

pub mod backend;
pub mod event_pump;
pub mod rpc;
pub mod storage;
