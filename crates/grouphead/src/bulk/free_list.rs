use super::BulkAllocator;
use crate::{CounterRowStore, Result};

/// Rounds through the counter/free-list protocol before giving up on a
/// group whose row keeps changing under other writers.
const MAX_ATTEMPTS: usize = 4;

/// Counter plus free list, one row per group.
///
/// Fresh numbers come from bumping the counter, which the store only does
/// while the free list is empty. Reverted numbers go to the sorted free list
/// and are handed out again, lowest first, before the counter moves.
pub struct FreeListAllocator<S> {
    store: S,
}

impl<S: CounterRowStore> FreeListAllocator<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: CounterRowStore> BulkAllocator for FreeListAllocator<S> {
    async fn alloc_ids(&self, group: &[u8], count: usize) -> Result<Vec<u64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let n = count as u64;
        for _attempt in 0..MAX_ATTEMPTS {
            if let Some(counter) = self.store.increment_if_no_free(group, n).await? {
                return Ok((counter - n + 1..=counter).collect());
            }
            match self.store.take_free(group, count).await? {
                Some(ids) if !ids.is_empty() => return Ok(ids),
                Some(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Free list drained concurrently (attempt {_attempt})");
                }
                None => {
                    if self.store.insert_row(group, n).await? {
                        return Ok((1..=n).collect());
                    }
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Counter row created concurrently (attempt {_attempt})");
                }
            }
        }
        Ok(Vec::new())
    }

    async fn revert_ids(&self, group: &[u8], ids: &[u64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.merge_free(group, ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCounterRows;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn first_allocation_creates_the_row() {
        let alloc = FreeListAllocator::new(MemoryCounterRows::new());
        assert_eq!(alloc.alloc_ids(b"g", 3).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(alloc.alloc_ids(b"g", 2).await.unwrap(), vec![4, 5]);
        assert_eq!(alloc.store().row(b"g"), Some((5, vec![])));
    }

    #[tokio::test]
    async fn reverted_ids_are_reused_first() {
        let alloc = FreeListAllocator::new(MemoryCounterRows::new());
        alloc.alloc_ids(b"g", 5).await.unwrap();
        alloc.revert_ids(b"g", &[4, 2]).await.unwrap();
        alloc.revert_ids(b"g", &[2]).await.unwrap();

        // Partial answer from the free list, callers ask again.
        assert_eq!(alloc.alloc_ids(b"g", 3).await.unwrap(), vec![2, 4]);
        assert_eq!(alloc.alloc_ids(b"g", 1).await.unwrap(), vec![6]);
    }

    /// Another writer creates the row between our miss and our insert.
    struct RacyRows {
        inner: MemoryCounterRows,
        raced: AtomicBool,
    }

    impl CounterRowStore for RacyRows {
        async fn increment_if_no_free(&self, group: &[u8], count: u64) -> Result<Option<u64>> {
            self.inner.increment_if_no_free(group, count).await
        }

        async fn take_free(&self, group: &[u8], count: usize) -> Result<Option<Vec<u64>>> {
            self.inner.take_free(group, count).await
        }

        async fn insert_row(&self, group: &[u8], counter: u64) -> Result<bool> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                assert!(self.inner.insert_row(group, 5).await?);
            }
            self.inner.insert_row(group, counter).await
        }

        async fn merge_free(&self, group: &[u8], ids: &[u64]) -> Result<()> {
            self.inner.merge_free(group, ids).await
        }
    }

    #[tokio::test]
    async fn concurrent_row_creation_retries_the_counter() {
        let alloc = FreeListAllocator::new(RacyRows {
            inner: MemoryCounterRows::new(),
            raced: AtomicBool::new(false),
        });
        assert_eq!(alloc.alloc_ids(b"g", 2).await.unwrap(), vec![6, 7]);
        assert_eq!(alloc.store().inner.row(b"g"), Some((7, vec![])));
    }

    #[tokio::test]
    async fn zero_count_touches_nothing() {
        let alloc = FreeListAllocator::new(MemoryCounterRows::new());
        assert!(alloc.alloc_ids(b"g", 0).await.unwrap().is_empty());
        assert_eq!(alloc.store().row(b"g"), None);
    }
}
