use super::BulkAllocator;
use crate::{CounterStore, Error, Result};

/// Cell key holding the allocation counter of a group.
const COUNTER_CELL: u64 = 0;

/// Allocates from a distributed counter cell per group.
///
/// Rolled-back numbers are never reused. The counter store should be
/// dedicated to allocation: [`CounterStore::purge_before`] would drop the
/// counters.
pub struct CounterCellAllocator<C> {
    counters: C,
}

impl<C: CounterStore> CounterCellAllocator<C> {
    pub const fn new(counters: C) -> Self {
        Self { counters }
    }
}

impl<C: CounterStore> BulkAllocator for CounterCellAllocator<C> {
    async fn alloc_ids(&self, group: &[u8], count: usize) -> Result<Vec<u64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let delta = i64::try_from(count).map_err(|_| Error::invalid("count out of range"))?;
        let value = self.counters.add(group, COUNTER_CELL, delta).await?;
        let high = u64::try_from(value)
            .map_err(|_| Error::backend(format!("negative allocation counter {value}")))?;
        let low = high
            .checked_sub(count as u64)
            .ok_or_else(|| Error::backend(format!("allocation counter {value} below batch")))?;
        Ok((low + 1..=high).collect())
    }

    async fn revert_ids(&self, _group: &[u8], _ids: &[u64]) -> Result<()> {
        Ok(())
    }
}
