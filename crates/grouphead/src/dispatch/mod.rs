//! Batching dispatcher.
//!
//! Allocate and rollback requests for a group are funnelled through a
//! bounded mailbox drained by a single task per active group. Each drained
//! batch costs at most a handful of [`BulkAllocator`](crate::BulkAllocator)
//! calls no matter how many requests it holds.

mod batching;
mod config;
mod registry;
mod request;
mod worker;

pub use batching::*;
pub use config::*;
pub use registry::*;
pub use request::*;
