#![doc = include_str!("../README.md")]

mod client;
mod common;
mod server;

pub use client::*;
pub use common::*;
pub use server::*;
// Downstream crates reach the allocators through `grouphead_wire::grouphead`.
pub use grouphead;
