//! Local actor allocators.
//!
//! Both actors keep the allocator state of recently used groups in memory
//! and write every mutation through a [`BackendTable`](crate::BackendTable)
//! before answering. A call touching several groups either succeeds for all
//! of them or leaves every group as it was.

mod interface;
mod local;
mod sharded;

pub use interface::*;
pub use local::*;
pub use sharded::*;
