//! Bulk allocator backends: slow, strongly consistent id sources that the
//! [dispatcher](crate::DispatcherRegistry) calls once per batch.

mod counter_cell;
mod free_list;
mod interface;

pub use counter_cell::*;
pub use free_list::*;
pub use interface::*;
