//! Minimal storage contracts the allocators and directory layouts are built
//! on, plus in-process implementations of each.

mod interface;
mod memory;

pub use interface::*;
pub use memory::*;
