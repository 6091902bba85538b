//! Owner of the per-group dispatcher workers.
//!
//! [`DispatcherRegistry`] maps each active group to the bounded mailbox of
//! its worker task, spawning workers on first use and replacing those that
//! were evicted for idleness. Shutdown is coordinated through a shared
//! [`CancellationToken`].

use super::{
    DispatcherConfig, GroupRequest,
    worker::{Handoff, Mailbox, Mailboxes, worker_loop},
};
use crate::{BulkAllocator, Error, Result};
use bytes::Bytes;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Attempts to deliver a request before giving up on a group whose workers
/// keep stopping underneath the caller.
const MAX_OFFER_ATTEMPTS: usize = 3;

/// Registry of per-group batching workers over one [`BulkAllocator`].
///
/// Must be used from within a Tokio runtime: workers are spawned lazily by
/// [`offer`](Self::offer).
pub struct DispatcherRegistry<B> {
    backend: Arc<B>,
    config: DispatcherConfig,
    mailboxes: Mailboxes,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl<B: BulkAllocator + 'static> DispatcherRegistry<B> {
    pub fn new(backend: B, config: DispatcherConfig) -> Self {
        Self::with_token(backend, config, CancellationToken::new())
    }

    /// Creates a registry that also stops accepting work once `shutdown_token`
    /// is cancelled elsewhere.
    pub fn with_token(backend: B, config: DispatcherConfig, shutdown_token: CancellationToken) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
            mailboxes: Mailboxes::default(),
            next_worker: AtomicUsize::new(0),
            shutdown_token,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of groups that currently have a registered worker.
    pub fn active_groups(&self) -> usize {
        self.mailboxes.read().len()
    }

    /// Puts `request` into the mailbox of `group`, starting a worker if the
    /// group has none.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The registry is shutting down. The request is dropped, so its
    ///   completion channel closes.
    /// - The group's worker stopped on every delivery attempt.
    pub async fn offer(&self, group: &Bytes, request: GroupRequest) -> Result<()> {
        let mut request = request;
        for _attempt in 0..MAX_OFFER_ATTEMPTS {
            if self.shutdown_token.is_cancelled() {
                return Err(Error::ServiceShutdown);
            }
            let mailbox = self.mailbox(group);
            match mailbox.send(request).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Mailbox of {group:?} closed, replacing (attempt {_attempt})");
                    request = returned;
                }
            }
        }
        Err(Error::ChannelError {
            context: format!(
                "Mailbox of {:?} kept closing",
                String::from_utf8_lossy(group)
            ),
        })
    }

    /// Allocates one number for `group` through its worker.
    pub async fn allocate(&self, group: &Bytes) -> Result<u64> {
        let (request, rx) = GroupRequest::allocate();
        self.offer(group, request).await?;
        Self::completion(rx).await
    }

    /// Gives `number` back to `group` through its worker.
    pub async fn rollback(&self, group: &Bytes, number: u64) -> Result<u64> {
        let (request, rx) = GroupRequest::rollback(number);
        self.offer(group, request).await?;
        Self::completion(rx).await
    }

    async fn completion(rx: oneshot::Receiver<Result<u64>>) -> Result<u64> {
        rx.await.map_err(|e| Error::ChannelError {
            context: format!("Worker dropped request: {e}"),
        })?
    }

    /// Returns a live mailbox for `group`, spawning its worker if needed.
    ///
    /// A replacement worker is chained behind the one it replaces, which may
    /// still be serving requests that raced its eviction.
    fn mailbox(&self, group: &Bytes) -> mpsc::Sender<GroupRequest> {
        if let Some(mailbox) = self.mailboxes.read().get(group) {
            if !mailbox.tx.is_closed() {
                return mailbox.tx.clone();
            }
        }

        let mut mailboxes = self.mailboxes.write();
        let predecessor = match mailboxes.get_mut(group) {
            Some(mailbox) if !mailbox.tx.is_closed() => return mailbox.tx.clone(),
            Some(mailbox) => mailbox.stopped.take(),
            None => None,
        };
        let (tx, rx) = mpsc::channel(self.config.requests_per_group.max(1));
        let (stopped, stopped_rx) = oneshot::channel();
        let worker_id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(worker_loop(
            worker_id,
            group.clone(),
            rx,
            Handoff { predecessor, stopped },
            Arc::clone(&self.backend),
            self.config,
            Arc::clone(&self.mailboxes),
        ));
        mailboxes.insert(
            group.clone(),
            Mailbox {
                tx: tx.clone(),
                stopped: Some(stopped_rx),
            },
        );
        tx
    }

    /// Gracefully shuts down every worker.
    ///
    /// - Cancels the shared [`CancellationToken`] so new offers fail.
    /// - Sends a [`GroupRequest::Shutdown`] to each worker, which first
    ///   completes everything already in its mailbox.
    /// - Waits up to `shutdown_timeout` per worker for acknowledgements.
    pub async fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new dispatcher requests");
        self.shutdown_token.cancel();

        let mailboxes: Vec<_> = self.mailboxes.write().drain().collect();

        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying {} workers to shut down", mailboxes.len());
        let mut shutdown_handles = Vec::with_capacity(mailboxes.len());
        for (group, mailbox) in mailboxes {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = mailbox.tx.send(GroupRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::trace!("Worker for {group:?} already stopped: {_e}");
            } else {
                shutdown_handles.push((group, rx));
            }
        }

        let per_worker = self.config.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(_group, rx)| async move {
            match timeout(per_worker, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker for {_group:?} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker for {_group:?} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker for {_group:?} shutdown timed out");
                }
            }
        });
        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Dispatcher shutdown complete");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}
