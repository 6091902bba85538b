use crate::server::telemetry::{decrement_connections_inflight, increment_connections_inflight};
use grouphead_wire::{GroupHead, GroupHeadServer};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// Task serving one client connection until it closes, fails, or the
/// shutdown token fires between two requests.
pub async fn connection_loop<S, H>(
    _conn_id: u64,
    stream: S,
    server: Arc<GroupHeadServer<H>>,
    shutdown_token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    H: GroupHead,
{
    #[cfg(feature = "tracing")]
    tracing::debug!("Connection {_conn_id} opened");
    increment_connections_inflight();

    match server.serve(stream, shutdown_token).await {
        Ok(_served) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Connection {_conn_id} closed after {_served} requests");
        }
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Connection {_conn_id} failed: {_e}");
        }
    }

    decrement_connections_inflight();
}
