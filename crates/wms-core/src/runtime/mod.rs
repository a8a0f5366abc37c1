//! Concurrency primitives shared by the server and client crates.
//!
//! - **`task_queue`** – serial, single-consumer task queues (one per manager
//!   subsystem) and a deterministic immediate queue for tests.
//! - **`subject`** – generic listener fan-out, parameterised by event type.
//! - **`peer`** – monitored peers with at-most-once death recipients.

pub mod peer;
pub mod subject;
pub mod task_queue;
