use super::{AdmStatus, GroupAllocator, is_valid_group};
use crate::{
    BackendTable, GroupEntry, HlStats, Record, Result, TablePair,
    error::{Error, ensure_distinct},
};
use bytes::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};
#[cfg(feature = "tracing")]
use tracing::instrument;

type Slot = Arc<Mutex<Option<GroupEntry>>>;
type SlotGuard = OwnedMutexGuard<Option<GroupEntry>>;

/// Allocator over cached [`GroupEntry`] values with one async lock per group.
///
/// Calls lock every group they touch in byte order, load entries that are not
/// cached yet with a single [`BackendTable::get_pairs`], and hold the locks
/// until the [`BackendTable::set_pairs`] round trip has finished. Unrelated
/// groups never contend.
///
/// A group with no backend row starts from an empty entry.
pub struct GroupHeadActor<T> {
    backend: T,
    slots: RwLock<HashMap<Bytes, Slot>>,
}

impl<T: BackendTable> GroupHeadActor<T> {
    pub fn new(backend: T) -> Self {
        Self {
            backend,
            slots: RwLock::default(),
        }
    }

    pub const fn backend(&self) -> &T {
        &self.backend
    }

    /// Allocates one number per group. See [`GroupAllocator::insert`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(groups = groups.len())))]
    pub async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        ensure_distinct(groups)?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let mut guards = self.lock_all(groups).await;
        self.load(groups, &mut guards).await?;
        self.commit(groups, &mut guards, |_, entry| entry.increment())
            .await
    }

    /// Rolls `numbers[i]` back in `groups[i]`.
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
        let mut guards = self.lock_all(groups).await;
        self.load(groups, &mut guards).await?;
        self.commit(groups, &mut guards, |i, entry| entry.rollback(numbers[i]))
            .await?;
        Ok(())
    }

    /// Folds the active generation into the stable one and returns the new
    /// stable high water mark.
    pub async fn move_down(&self, group: &Bytes) -> Result<u64> {
        let groups = core::slice::from_ref(group);
        let mut guards = self.lock_all(groups).await;
        self.load(groups, &mut guards).await?;
        let highs = self
            .commit(groups, &mut guards, |_, entry| entry.move_down())
            .await?;
        Ok(highs[0])
    }

    /// Returns the stable high water mark.
    pub async fn get_down(&self, group: &Bytes) -> Result<u64> {
        self.with_entry(group, |entry| entry.high1).await
    }

    /// Replaces the stable generation if its high is still `old_high`.
    pub async fn update_down(
        &self,
        group: &Bytes,
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> Result<bool> {
        let groups = core::slice::from_ref(group);
        let mut guards = self.lock_all(groups).await;
        self.load(groups, &mut guards).await?;
        if guards[0].is_some_and(|entry| entry.high1 != old_high) {
            return Ok(false);
        }
        let swapped = self
            .commit(groups, &mut guards, |_, entry| {
                entry.update_down(old_high, low, high, count)
            })
            .await?;
        Ok(swapped[0])
    }

    /// Creates the backend row of a group that does not have one yet.
    pub async fn adm_create_group(&self, group: &Bytes) -> AdmStatus {
        if !is_valid_group(group) {
            return AdmStatus::Invalid;
        }
        let mut guard = self.slot(group).lock_owned().await;
        let existing = match self.backend.get_pairs(core::slice::from_ref(group)).await {
            Ok(rows) => rows.into_iter().find(|pair| pair.group == *group),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to look up group {group:?}: {_e}");
                return AdmStatus::BackendError;
            }
        };
        if let Some(pair) = existing {
            if guard.is_none() {
                *guard = GroupEntry::decode(&pair.value).ok();
            }
            return AdmStatus::Exists;
        }

        let entry = guard.unwrap_or_default();
        let stored = match entry.encode() {
            Ok(value) => {
                self.backend
                    .set_pairs(&[TablePair::new(group.clone(), value)])
                    .await
            }
            Err(e) => Err(e),
        };
        match stored {
            Ok(()) => {
                *guard = Some(entry);
                AdmStatus::Created
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to create group {group:?}: {_e}");
                AdmStatus::BackendError
            }
        }
    }

    /// Merged `(low, high, count)` of a group.
    pub async fn hl_stats(&self, group: &Bytes) -> Result<HlStats> {
        self.with_entry(group, GroupEntry::hl_stats).await
    }

    async fn with_entry<R>(&self, group: &Bytes, f: impl FnOnce(&GroupEntry) -> R) -> Result<R> {
        let groups = core::slice::from_ref(group);
        let mut guards = self.lock_all(groups).await;
        self.load(groups, &mut guards).await?;
        Ok(f(&guards[0].unwrap_or_default()))
    }

    fn slot(&self, group: &Bytes) -> Slot {
        if let Some(slot) = self.slots.read().get(group) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(group.clone()).or_default())
    }

    /// Locks the slot of every group in byte order and returns the guards in
    /// input order.
    async fn lock_all(&self, groups: &[Bytes]) -> Vec<SlotGuard> {
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_unstable_by(|&a, &b| groups[a].cmp(&groups[b]));

        let mut guards: Vec<Option<SlotGuard>> = (0..groups.len()).map(|_| None).collect();
        for i in order {
            guards[i] = Some(self.slot(&groups[i]).lock_owned().await);
        }
        guards.into_iter().flatten().collect()
    }

    /// Fills the slots that are not cached yet from the backend.
    async fn load(&self, groups: &[Bytes], guards: &mut [SlotGuard]) -> Result<()> {
        let missing: Vec<Bytes> = groups
            .iter()
            .zip(guards.iter())
            .filter(|(_, guard)| guard.is_none())
            .map(|(group, _)| group.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let rows = self.backend.get_pairs(&missing).await?;
        let mut found = HashMap::with_capacity(rows.len());
        for pair in rows {
            found.insert(pair.group, GroupEntry::decode(&pair.value)?);
        }
        for (group, guard) in groups.iter().zip(guards.iter_mut()) {
            if guard.is_none() {
                **guard = Some(found.get(group).copied().unwrap_or_default());
            }
        }
        Ok(())
    }

    /// Applies `f` to every locked entry and persists the result. On any
    /// failure all entries go back to their state before the call.
    async fn commit<R>(
        &self,
        groups: &[Bytes],
        guards: &mut [SlotGuard],
        mut f: impl FnMut(usize, &mut GroupEntry) -> R + Send,
    ) -> Result<Vec<R>>
    where
        R: Send,
    {
        let snapshots: Vec<Option<GroupEntry>> = guards.iter().map(|guard| **guard).collect();
        let mut out = Vec::with_capacity(groups.len());
        let mut pairs = Vec::with_capacity(groups.len());
        let mut result = Ok(());

        for (i, (group, guard)) in groups.iter().zip(guards.iter_mut()).enumerate() {
            let entry = guard.get_or_insert_with(GroupEntry::new);
            out.push(f(i, entry));
            match entry.encode() {
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
            tracing::debug!("Restoring {} group entries after failed write: {e}", groups.len());
            for (guard, snapshot) in guards.iter_mut().zip(snapshots) {
                **guard = snapshot;
            }
            return Err(e);
        }
        Ok(out)
    }
}

impl<T: BackendTable> GroupAllocator for GroupHeadActor<T> {
    async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        Self::insert(self, groups).await
    }

    async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        Self::revert(self, groups, numbers).await
    }
}
