//! Types that cross the client/server boundary.
//!
//! The transport itself is opaque ("send a request, receive a typed reply"),
//! so this module only defines what travels: error codes, info snapshots,
//! event payloads and the service traits a transport implements.

pub mod errors;
pub mod events;
pub mod info;
pub mod service;
