//! Infrastructure layer for the client library.
//!
//! Only the proxy lives here: how a service is found, cached and forgotten.
//! The application adapters depend on the [`proxy::ServiceDirectory`] trait,
//! never on a concrete directory.

pub mod proxy;
