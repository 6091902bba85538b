//! Partitioned directory store.
//!
//! Two layouts of the per-group `number -> overview` directory over a
//! [`ClusteredStore`](crate::ClusteredStore): [`SimpleGroupStore`] with one
//! partition per group and [`TwoLevelGroupStore`] with one partition per
//! 2^24-number bucket plus a bucket index. Both keep approximate live
//! counts in [`CounterStore`](crate::CounterStore) cells per coarse expiry
//! window (see [`Granularity`]).

mod granularity;
mod interface;
mod overview;
mod simple;
mod two_level;

pub use granularity::*;
pub use interface::*;
pub use overview::*;
pub use simple::*;
pub use two_level::*;
