//! Spawns connection tasks and shuts them down in phases.
//!
//! New connections are refused once shutdown starts. Requests already
//! inside the allocator get up to the configured timeout to finish; after
//! that the shared [`CancellationToken`] closes every connection at its next
//! request boundary.

use crate::server::{
    pool::worker::connection_loop,
    service::handler::get_requests_inflight,
};
use core::time::Duration;
use grouphead_wire::{
    GroupHead, GroupHeadServer,
    grouphead::{Error, Result},
};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::{sleep, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How long the last phase waits for connection tasks to exit.
const EXIT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ConnectionPool<H> {
    server: Arc<GroupHeadServer<H>>,
    tracker: TaskTracker,
    next_conn: AtomicU64,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl<H: GroupHead + 'static> ConnectionPool<H> {
    pub fn new(
        server: GroupHeadServer<H>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            server: Arc::new(server),
            tracker: TaskTracker::new(),
            next_conn: AtomicU64::new(0),
            shutdown_token,
            shutdown_timeout,
        }
    }

    /// Open connection tasks.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Spawns a task serving `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has started.
    pub fn spawn<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.tracker.is_closed() || self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let fut = connection_loop(
            conn_id,
            stream,
            Arc::clone(&self.server),
            self.shutdown_token.clone(),
        );
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("connection", conn_id))
        };
        self.tracker.spawn(fut);
        Ok(())
    }

    /// Gracefully shuts down every connection.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new connections ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new connections");
        self.tracker.close();

        // === Phase 1: Let in-flight requests finish ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight requests ({} active)",
            get_requests_inflight()
        );
        let drain_result = timeout(self.shutdown_timeout, async {
            while get_requests_inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight requests drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} requests still active)",
                    get_requests_inflight()
                );
            }
        }

        // === Phase 2: Close connections at their next request boundary ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling {} connections via shutdown token", self.len());
        self.shutdown_token.cancel();

        // === Phase 3: Wait for connection tasks to exit ===
        if timeout(EXIT_TIMEOUT, self.tracker.wait()).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("{} connections did not exit in time", self.len());
            return Err(Error::ChannelError {
                context: format!("{} connections still open after shutdown", self.len()),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Connection pool shutdown complete");

        Ok(())
    }
}
