//! The allocator service behind the listener.
//!
//! [`GroupHeadService`] owns the configured [`Allocator`] and the
//! [`ConnectionPool`] serving it. Every allocator call is counted as an
//! in-flight request, which is what shutdown waits for before closing
//! connections.

use crate::server::{
    config::{AllocatorKind, ServerConfig},
    pool::manager::ConnectionPool,
    telemetry::{
        increment_numbers_allocated, increment_numbers_reverted, increment_request_errors,
        increment_requests, record_request_duration,
    },
};
use bytes::Bytes;
use grouphead_wire::{
    GroupHead, GroupHeadServer,
    grouphead::{
        AdmStatus, GroupAllocator, GroupHeadActor, MemoryBackendTable, Result,
        ShardedGroupHeadActor,
    },
};
use portable_atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

static REQUESTS_INFLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Allocator calls currently running, across every connection.
pub fn get_requests_inflight() -> usize {
    REQUESTS_INFLIGHT.load(Ordering::Acquire)
}

/// Counts one allocator call from creation to drop.
struct RequestGuard {
    start: Instant,
}

impl RequestGuard {
    fn new() -> Self {
        REQUESTS_INFLIGHT.fetch_add(1, Ordering::AcqRel);
        increment_requests();
        Self {
            start: Instant::now(),
        }
    }

    fn finish<T>(self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            increment_request_errors();
        }
        res
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        REQUESTS_INFLIGHT.fetch_sub(1, Ordering::AcqRel);
        record_request_duration(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// The allocator selected by [`ServerConfig::allocator`], over an in-memory
/// backend table.
pub enum Allocator {
    Actor(GroupHeadActor<MemoryBackendTable>),
    Sharded(ShardedGroupHeadActor<MemoryBackendTable>),
}

impl Allocator {
    pub fn from_config(config: &ServerConfig) -> Self {
        match config.allocator {
            AllocatorKind::Actor => Self::Actor(GroupHeadActor::new(MemoryBackendTable::new())),
            AllocatorKind::Sharded => Self::Sharded(ShardedGroupHeadActor::with_config(
                MemoryBackendTable::new(),
                config.sharded,
            )),
        }
    }
}

impl GroupAllocator for Allocator {
    async fn insert(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        let guard = RequestGuard::new();
        let res = match self {
            Self::Actor(actor) => actor.insert(groups).await,
            Self::Sharded(actor) => actor.insert(groups).await,
        };
        if let Ok(numbers) = &res {
            increment_numbers_allocated(numbers.len() as u64);
        }
        guard.finish(res)
    }

    async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        let guard = RequestGuard::new();
        let res = match self {
            Self::Actor(actor) => actor.revert(groups, numbers).await,
            Self::Sharded(actor) => actor.revert(groups, numbers).await,
        };
        if res.is_ok() {
            increment_numbers_reverted(numbers.len() as u64);
        }
        guard.finish(res)
    }
}

impl GroupHead for Allocator {
    async fn move_down(&self, group: &Bytes) -> Result<u64> {
        let guard = RequestGuard::new();
        let res = match self {
            Self::Actor(actor) => GroupHead::move_down(actor, group).await,
            Self::Sharded(actor) => GroupHead::move_down(actor, group).await,
        };
        guard.finish(res)
    }

    async fn get_down(&self, group: &Bytes) -> Result<u64> {
        let guard = RequestGuard::new();
        let res = match self {
            Self::Actor(actor) => GroupHead::get_down(actor, group).await,
            Self::Sharded(actor) => GroupHead::get_down(actor, group).await,
        };
        guard.finish(res)
    }

    async fn update_down(
        &self,
        group: &Bytes,
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> Result<bool> {
        let guard = RequestGuard::new();
        let res = match self {
            Self::Actor(actor) => {
                GroupHead::update_down(actor, group, old_high, low, high, count).await
            }
            Self::Sharded(actor) => {
                GroupHead::update_down(actor, group, old_high, low, high, count).await
            }
        };
        guard.finish(res)
    }

    async fn adm_create_group(&self, group: &Bytes) -> AdmStatus {
        let _guard = RequestGuard::new();
        let status = match self {
            Self::Actor(actor) => GroupHead::adm_create_group(actor, group).await,
            Self::Sharded(actor) => GroupHead::adm_create_group(actor, group).await,
        };
        if matches!(status, AdmStatus::BackendError | AdmStatus::Invalid) {
            increment_request_errors();
        }
        status
    }
}

/// Accepts connections for the configured allocator and shuts them down
/// gracefully.
#[derive(Clone)]
pub struct GroupHeadService {
    pool: Arc<ConnectionPool<Allocator>>,
}

impl GroupHeadService {
    pub fn new(config: ServerConfig) -> Self {
        let server = GroupHeadServer::new(Allocator::from_config(&config))
            .with_max_groups(config.max_groups_per_request);
        let pool = ConnectionPool::new(server, CancellationToken::new(), config.shutdown_timeout);
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open client connections.
    pub fn connections(&self) -> usize {
        self.pool.len()
    }

    /// Serves `stream` on its own task.
    ///
    /// # Errors
    ///
    /// Refuses the connection once shutdown has started.
    pub fn accept<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.pool.spawn(stream)
    }

    /// Stops accepting, lets in-flight requests finish and closes every
    /// connection.
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }
}
