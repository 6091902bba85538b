use super::{DispatcherConfig, GroupRequest};
use crate::{BulkAllocator, Error, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

pub(crate) type Mailboxes = Arc<RwLock<HashMap<Bytes, Mailbox>>>;

/// Registry entry of one group's worker.
pub(crate) struct Mailbox {
    pub(crate) tx: mpsc::Sender<GroupRequest>,
    /// Resolves once the worker has served its last request. Taken by the
    /// worker that replaces it.
    pub(crate) stopped: Option<oneshot::Receiver<()>>,
}

/// Hand-over between a worker and the one that replaces it.
pub(crate) struct Handoff {
    /// Stop signal of the worker being replaced, if any.
    pub(crate) predecessor: Option<oneshot::Receiver<()>>,
    pub(crate) stopped: oneshot::Sender<()>,
}

type Completion = oneshot::Sender<Result<u64>>;

/// Scratch state of one worker, reused across batches.
struct Batch {
    allocs: Vec<Completion>,
    rollbacks: Vec<(u64, Completion)>,
    /// Numbers to hand back in the single `revert_ids` call of a batch.
    reverts: Vec<u64>,
    acks: Vec<oneshot::Sender<()>>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            allocs: Vec::with_capacity(capacity),
            rollbacks: Vec::with_capacity(capacity),
            reverts: Vec::with_capacity(capacity),
            acks: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.allocs.len() + self.rollbacks.len()
    }

    /// Queues a request. Returns `true` for a shutdown request.
    fn push(&mut self, request: GroupRequest) -> bool {
        match request {
            GroupRequest::Allocate { response } => self.allocs.push(response),
            GroupRequest::Rollback { number, response } => self.rollbacks.push((number, response)),
            GroupRequest::Shutdown { response } => {
                self.acks.push(response);
                return true;
            }
        }
        false
    }

    /// Completes every queued allocate and rollback.
    async fn perform<B: BulkAllocator>(&mut self, _worker_id: usize, group: &[u8], backend: &B) {
        if self.len() == 0 {
            return;
        }

        // A rolled back number satisfies an allocate of the same batch.
        while !self.allocs.is_empty() && !self.rollbacks.is_empty() {
            if let (Some(alloc), Some((number, rollback))) = (self.allocs.pop(), self.rollbacks.pop()) {
                if alloc.send(Ok(number)).is_err() {
                    self.reverts.push(number);
                }
                let _ = rollback.send(Ok(number));
            }
        }

        while !self.allocs.is_empty() {
            let wanted = self.allocs.len();
            match backend.alloc_ids(group, wanted).await {
                Ok(ids) if ids.is_empty() => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_worker_id} got no ids for {wanted} allocates");
                    let err = Error::exhausted(group);
                    for alloc in self.allocs.drain(..) {
                        let _ = alloc.send(Err(err.clone()));
                    }
                }
                Ok(ids) => {
                    let served = ids.len().min(wanted);
                    let mut ids = ids.into_iter();
                    for (alloc, id) in self.allocs.drain(..served).zip(ids.by_ref()) {
                        if alloc.send(Ok(id)).is_err() {
                            self.reverts.push(id);
                        }
                    }
                    // More than asked for.
                    self.reverts.extend(ids);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {_worker_id} failed {wanted} allocates: {e}");
                    for alloc in self.allocs.drain(..) {
                        let _ = alloc.send(Err(e.clone()));
                    }
                }
            }
        }

        self.reverts
            .extend(self.rollbacks.iter().map(|(number, _)| *number));
        if !self.reverts.is_empty() {
            let result = backend.revert_ids(group, &self.reverts).await;
            #[cfg(feature = "tracing")]
            if let Err(_e) = &result {
                tracing::debug!(
                    "Worker {_worker_id} failed to revert {} ids: {_e}",
                    self.reverts.len()
                );
            }
            for (number, rollback) in self.rollbacks.drain(..) {
                let _ = rollback.send(result.clone().map(|()| number));
            }
            self.reverts.clear();
        }
    }
}

/// Serves the mailbox of one group until shutdown, idle eviction or until
/// every sender is gone.
///
/// Each round blocks for one request, then drains whatever else is already
/// queued (up to `requests_per_group`) into one batch. When the worker stops
/// it closes its mailbox and serves what was still queued, so a request that
/// made it into the mailbox is always completed.
///
/// A worker replacing an evicted one waits for its predecessor to stop
/// before touching its own mailbox; at most one worker per group talks to
/// the backend.
pub(crate) async fn worker_loop<B: BulkAllocator>(
    worker_id: usize,
    group: Bytes,
    mut rx: mpsc::Receiver<GroupRequest>,
    handoff: Handoff,
    backend: Arc<B>,
    config: DispatcherConfig,
    mailboxes: Mailboxes,
) {
    if let Some(predecessor) = handoff.predecessor {
        // Dropped or signalled, either way the old worker is done.
        let _ = predecessor.await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started for {group:?}");

    let capacity = config.requests_per_group.max(1);
    let mut batch = Batch::with_capacity(capacity);

    loop {
        let first = match config.idle_timeout {
            Some(idle) => match timeout(idle, rx.recv()).await {
                Ok(request) => request,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {worker_id} idle, evicting");
                    break;
                }
            },
            None => rx.recv().await,
        };
        let Some(first) = first else {
            break;
        };

        let mut stop = batch.push(first);
        while !stop && batch.len() < capacity {
            match rx.try_recv() {
                Ok(request) => stop = batch.push(request),
                Err(_) => break,
            }
        }
        batch.perform(worker_id, &group, &*backend).await;
        if stop {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} received shutdown signal");
            break;
        }
    }

    // Nothing new gets in; serve what raced the close.
    rx.close();
    while let Some(request) = rx.recv().await {
        batch.push(request);
        if batch.len() >= capacity {
            batch.perform(worker_id, &group, &*backend).await;
        }
    }
    batch.perform(worker_id, &group, &*backend).await;

    {
        let mut mailboxes = mailboxes.write();
        if mailboxes.get(&group).is_some_and(|m| m.tx.is_closed()) {
            mailboxes.remove(&group);
        }
    }
    let _ = handoff.stopped.send(());

    for ack in batch.acks.drain(..) {
        if ack.send(()).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
