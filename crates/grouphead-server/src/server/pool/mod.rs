//! Connection tasks and their coordinated shutdown.
//!
//! - [`manager`] - [`ConnectionPool`](manager::ConnectionPool): spawns,
//!   tracks and drains connection tasks.
//! - [`worker`] - the per-connection task.

pub mod manager;
pub mod worker;
