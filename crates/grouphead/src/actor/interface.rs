use crate::Result;
use bytes::Bytes;
use core::future::Future;
use std::sync::Arc;

/// Hands out one article number per group for a single post and takes them
/// back when the post fails.
pub trait GroupAllocator: Send + Sync {
    /// Allocates one number per group, returned in input order.
    ///
    /// Groups must be distinct.
    ///
    /// # Errors
    ///
    /// On error no group keeps a number from this call.
    fn insert(&self, groups: &[Bytes]) -> impl Future<Output = Result<Vec<u64>>> + Send;

    /// Gives `numbers[i]` back to `groups[i]`.
    fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> impl Future<Output = Result<()>> + Send;
}

impl<A: GroupAllocator> GroupAllocator for Arc<A> {
    fn insert(&self, groups: &[Bytes]) -> impl Future<Output = Result<Vec<u64>>> + Send {
        (**self).insert(groups)
    }

    fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> impl Future<Output = Result<()>> + Send {
        (**self).revert(groups, numbers)
    }
}

/// Outcome of an administrative group creation. The discriminant is the
/// status byte used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdmStatus {
    Created = 0,
    Exists = 1,
    BackendError = 3,
    /// The name is empty or contains a NUL byte.
    Invalid = 4,
}

impl AdmStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Maps a wire status byte back. Unknown codes read as a backend error.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Created,
            1 => Self::Exists,
            4 => Self::Invalid,
            _ => Self::BackendError,
        }
    }
}

/// Whether `group` can be used as a group name on every layer, including the
/// NUL-delimited remote protocol.
pub fn is_valid_group(group: &[u8]) -> bool {
    !group.is_empty() && !group.contains(&0)
}
