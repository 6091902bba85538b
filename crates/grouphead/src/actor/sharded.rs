use super::GroupAllocator;
use crate::{
    BackendTable, GroupRte, HlStats, Record, Result, TablePair, TimedGroupRte,
    error::{Error, ensure_distinct},
};
use bytes::Bytes;
use core::time::Duration;
use std::collections::HashMap;
use tokio::{
    sync::{Mutex, MutexGuard},
    time::Instant,
};
#[cfg(feature = "tracing")]
use tracing::instrument;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Tuning for [`ShardedGroupHeadActor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardedConfig {
    /// Number of shards groups hash into. Zero is treated as one.
    pub shards: usize,
    /// How long a cached entry is trusted before it is re-read.
    pub cache_ttl: Duration,
}

impl Default for ShardedConfig {
    fn default() -> Self {
        Self {
            shards: 256,
            cache_ttl: Duration::from_secs(5),
        }
    }
}

type Shard = HashMap<Bytes, TimedGroupRte>;

/// Allocator over [`GroupRte`] values cached in hashed shards.
///
/// Each shard is one async lock over its cache, so groups in different
/// shards proceed in parallel and a call locks only the shards it touches,
/// in ascending index order. Cache entries expire after
/// [`ShardedConfig::cache_ttl`], letting several instances share a backend
/// as long as each group is mostly written by one of them.
pub struct ShardedGroupHeadActor<T> {
    backend: T,
    shards: Box<[Mutex<Shard>]>,
    cache_ttl: Duration,
}

impl<T: BackendTable> ShardedGroupHeadActor<T> {
    pub fn new(backend: T) -> Self {
        Self::with_config(backend, ShardedConfig::default())
    }

    pub fn with_config(backend: T, config: ShardedConfig) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| Mutex::new(Shard::new()))
            .collect();
        Self {
            backend,
            shards,
            cache_ttl: config.cache_ttl,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_of(&self, group: &[u8]) -> usize {
        (fnv1a(group) % self.shards.len() as u64) as usize
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(groups = groups.len())))]
    pub async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        ensure_distinct(groups)?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let mut locked = self.lock_shards(groups).await;
        self.load(groups, &mut locked).await?;
        self.commit(groups, &mut locked, |_, rte| rte.increment())
            .await
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(groups = groups.len())))]
    pub async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        if groups.len() != numbers.len() {
            return Err(Error::invalid(format!(
                "length mismatch {} != {}",
                groups.len(),
                numbers.len()
            )));
        }
        ensure_distinct(groups)?;
        if groups.is_empty() {
            return Ok(());
        }
        let mut locked = self.lock_shards(groups).await;
        self.load(groups, &mut locked).await?;
        self.commit(groups, &mut locked, |i, rte| rte.rollback(numbers[i]))
            .await?;
        Ok(())
    }

    pub async fn hl_stats(&self, group: &Bytes) -> Result<HlStats> {
        let groups = core::slice::from_ref(group);
        let mut locked = self.lock_shards(groups).await;
        self.load(groups, &mut locked).await?;
        Ok(locked
            .get(group)
            .map(|cached| cached.rte.hl_stats())
            .unwrap_or_default())
    }

    async fn lock_shards(&self, groups: &[Bytes]) -> LockedShards<'_> {
        let mut indices: Vec<usize> = groups.iter().map(|g| self.shard_of(g)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for &i in &indices {
            guards.push(self.shards[i].lock().await);
        }
        LockedShards {
            actor_shards: self.shards.len(),
            indices,
            guards,
        }
    }

    /// Re-reads every group whose cache entry is missing or expired.
    async fn load(&self, groups: &[Bytes], locked: &mut LockedShards<'_>) -> Result<()> {
        let now = Instant::now();
        let stale: Vec<Bytes> = groups
            .iter()
            .filter(|g| locked.get(g).is_none_or(|cached| cached.is_expired(now)))
            .cloned()
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        let rows = self.backend.get_pairs(&stale).await?;
        let mut found = HashMap::with_capacity(rows.len());
        for pair in rows {
            found.insert(pair.group, GroupRte::decode(&pair.value)?);
        }
        let expires = Instant::now() + self.cache_ttl;
        for group in stale {
            let rte = found.get(&group).copied().unwrap_or_default();
            locked.insert(group, TimedGroupRte::new(rte, expires));
        }
        Ok(())
    }

    async fn commit<R>(
        &self,
        groups: &[Bytes],
        locked: &mut LockedShards<'_>,
        mut f: impl FnMut(usize, &mut GroupRte) -> R + Send,
    ) -> Result<Vec<R>>
    where
        R: Send,
    {
        let mut snapshots = Vec::with_capacity(groups.len());
        let mut out = Vec::with_capacity(groups.len());
        let mut pairs = Vec::with_capacity(groups.len());
        let mut result = Ok(());

        for (i, group) in groups.iter().enumerate() {
            let cached = locked.get_mut(group);
            snapshots.push(cached.rte);
            out.push(f(i, &mut cached.rte));
            match cached.rte.encode() {
                Ok(value) => pairs.push(TablePair::new(group.clone(), value)),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if result.is_ok() {
            result = self.backend.set_pairs(&pairs).await;
        }

        if let Err(e) = result {
            #[cfg(feature = "tracing")]
            tracing::debug!("Restoring {} cached ranges after failed write: {e}", snapshots.len());
            for (group, snapshot) in groups.iter().zip(snapshots) {
                locked.get_mut(group).rte = snapshot;
            }
            return Err(e);
        }

        let expires = Instant::now() + self.cache_ttl;
        for group in groups {
            locked.get_mut(group).expires = expires;
        }
        Ok(out)
    }
}

impl<T: BackendTable> GroupAllocator for ShardedGroupHeadActor<T> {
    async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        Self::insert(self, groups).await
    }

    async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        Self::revert(self, groups, numbers).await
    }
}

/// The shards locked by one call, in ascending index order.
struct LockedShards<'a> {
    actor_shards: usize,
    indices: Vec<usize>,
    guards: Vec<MutexGuard<'a, Shard>>,
}

impl LockedShards<'_> {
    fn shard(&mut self, group: &[u8]) -> &mut Shard {
        let index = (fnv1a(group) % self.actor_shards as u64) as usize;
        // Every group of the call had its shard locked up front.
        let pos = self.indices.partition_point(|&i| i < index);
        &mut *self.guards[pos]
    }

    fn get(&self, group: &[u8]) -> Option<&TimedGroupRte> {
        let index = (fnv1a(group) % self.actor_shards as u64) as usize;
        let pos = self.indices.binary_search(&index).ok()?;
        self.guards[pos].get(group)
    }

    fn insert(&mut self, group: Bytes, cached: TimedGroupRte) {
        self.shard(&group).insert(group, cached);
    }

    /// Entry of a group that went through `load` in this call.
    fn get_mut(&mut self, group: &Bytes) -> &mut TimedGroupRte {
        self.shard(group)
            .entry(group.clone())
            .or_insert_with(|| TimedGroupRte::new(GroupRte::new(), Instant::now()))
    }
}
