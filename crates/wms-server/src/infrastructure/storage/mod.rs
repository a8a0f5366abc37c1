//! Storage infrastructure: configuration file and persisted session state.
//!
//! - `config` reads the TOML configuration file, falling back to defaults on
//!   first run.
//! - `kv_store` is the flat string key-value store that session state is
//!   persisted to for recovery.  It has an in-memory implementation and one
//!   backed by a TOML file.

pub mod config;
pub mod kv_store;
