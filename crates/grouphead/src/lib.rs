#![doc = include_str!("../README.md")]

mod actor;
mod bulk;
mod directory;
mod dispatch;
mod error;
mod model;
mod posting;
mod store;
#[cfg(test)]
mod testing;
mod time;

pub use crate::actor::*;
pub use crate::bulk::*;
pub use crate::directory::*;
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::model::*;
pub use crate::posting::*;
pub use crate::store::*;
pub use crate::time::*;
