//! Allocator service wiring.
//!
//! - [`handler`] - [`GroupHeadService`](handler::GroupHeadService): builds the
//!   configured allocator, accepts connections and coordinates shutdown.

pub mod handler;
