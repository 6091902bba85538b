use super::DispatcherRegistry;
use crate::{
    BulkAllocator, GroupAllocator, Result,
    error::{Error, ensure_distinct},
};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;

/// [`GroupAllocator`] backed by a [`DispatcherRegistry`].
///
/// Every group of a post becomes one request in that group's mailbox, all
/// offered concurrently. If any of them fails, the numbers the other groups
/// did get are rolled back before the error is returned.
pub struct BatchingAllocator<B> {
    registry: Arc<DispatcherRegistry<B>>,
}

impl<B> Clone for BatchingAllocator<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<B: BulkAllocator + 'static> BatchingAllocator<B> {
    pub const fn new(registry: Arc<DispatcherRegistry<B>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DispatcherRegistry<B> {
        &self.registry
    }
}

impl<B: BulkAllocator + 'static> GroupAllocator for BatchingAllocator<B> {
    async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        ensure_distinct(groups)?;
        let results = join_all(groups.iter().map(|group| self.registry.allocate(group))).await;

        let Some(err) = results.iter().find_map(|r| r.as_ref().err().cloned()) else {
            return Ok(results.into_iter().flatten().collect());
        };

        let rollbacks = groups
            .iter()
            .zip(&results)
            .filter_map(|(group, r)| r.as_ref().ok().map(|n| (group, *n)))
            .map(|(group, number)| async move {
                if let Err(_e) = self.registry.rollback(group, number).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Leaving gap {number} in {group:?}: {_e}");
                }
            });
        join_all(rollbacks).await;
        Err(err)
    }

    async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        if groups.len() != numbers.len() {
            return Err(Error::invalid(format!(
                "length mismatch {} != {}",
                groups.len(),
                numbers.len()
            )));
        }
        let results = join_all(
            groups
                .iter()
                .zip(numbers)
                .map(|(group, number)| self.registry.rollback(group, *number)),
        )
        .await;
        results.into_iter().find_map(Result::err).map_or(Ok(()), Err)
    }
}
