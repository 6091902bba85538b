use crate::Result;
use core::future::Future;
use std::sync::Arc;

/// A backend that allocates and reclaims article numbers in bulk.
pub trait BulkAllocator: Send + Sync {
    /// Allocates up to `count` numbers for `group`.
    ///
    /// May return fewer than asked for; callers ask again for the rest. An
    /// empty answer without error means the backend cannot make progress.
    fn alloc_ids(&self, group: &[u8], count: usize) -> impl Future<Output = Result<Vec<u64>>> + Send;

    /// Gives `ids` back to `group`. Backends without reuse may ignore them.
    fn revert_ids(&self, group: &[u8], ids: &[u64]) -> impl Future<Output = Result<()>> + Send;
}

impl<B: BulkAllocator> BulkAllocator for Arc<B> {
    fn alloc_ids(&self, group: &[u8], count: usize) -> impl Future<Output = Result<Vec<u64>>> + Send {
        (**self).alloc_ids(group, count)
    }

    fn revert_ids(&self, group: &[u8], ids: &[u64]) -> impl Future<Output = Result<()>> + Send {
        (**self).revert_ids(group, ids)
    }
}
