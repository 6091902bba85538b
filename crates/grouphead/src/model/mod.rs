//! Range merge model.
//!
//! The per-group allocator state kept by the local actors: [`GroupEntry`]
//! (two generations, used by [`GroupHeadActor`](crate::GroupHeadActor)) and
//! [`GroupRte`] (a single start/high/lost range, used by
//! [`ShardedGroupHeadActor`](crate::ShardedGroupHeadActor)). Both are plain
//! values; persistence goes through the [`Record`] MessagePack codec.

mod entry;
mod rte;

pub use entry::*;
pub use rte::*;

use crate::Result;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// A value persisted as the `value` column of a
/// [`TablePair`](crate::TablePair).
///
/// Encoded as a MessagePack array in field declaration order.
pub trait Record: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec(self)?))
    }

    fn decode(raw: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(raw)?)
    }
}

/// `(low, high, count)` as reported to readers. All zero means the group has
/// never been posted to (or everything was rolled back).
pub type HlStats = (u64, u64, u64);
