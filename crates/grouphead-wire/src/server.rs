//! Server side of the remote allocator protocol.

use crate::{
    Command, Error, MAX_GROUPS, Result, UPDATE_OK, read_command, read_field, write_error,
};
use bytes::Bytes;
use core::future::Future;
use grouphead::{AdmStatus, BackendTable, GroupAllocator, GroupHeadActor, ShardedGroupHeadActor};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// An allocator that can be served remotely: [`GroupAllocator`] plus the
/// administrative operations of the protocol.
pub trait GroupHead: GroupAllocator {
    fn move_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send;

    fn get_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send;

    fn update_down(
        &self,
        group: &Bytes,
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> impl Future<Output = grouphead::Result<bool>> + Send;

    fn adm_create_group(&self, group: &Bytes) -> impl Future<Output = AdmStatus> + Send;
}

impl<T: BackendTable> GroupHead for GroupHeadActor<T> {
    fn move_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send {
        GroupHeadActor::move_down(self, group)
    }

    fn get_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send {
        GroupHeadActor::get_down(self, group)
    }

    fn update_down(
        &self,
        group: &Bytes,
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> impl Future<Output = grouphead::Result<bool>> + Send {
        GroupHeadActor::update_down(self, group, old_high, low, high, count)
    }

    fn adm_create_group(&self, group: &Bytes) -> impl Future<Output = AdmStatus> + Send {
        GroupHeadActor::adm_create_group(self, group)
    }
}

/// The sharded actor keeps a single range per group, so there is no stable
/// generation to move or update. Groups are created on first use.
impl<T: BackendTable> GroupHead for ShardedGroupHeadActor<T> {
    async fn move_down(&self, _group: &Bytes) -> grouphead::Result<u64> {
        Err(unsupported(Command::MoveDown))
    }

    async fn get_down(&self, _group: &Bytes) -> grouphead::Result<u64> {
        Err(unsupported(Command::GetDown))
    }

    async fn update_down(
        &self,
        _group: &Bytes,
        _old_high: u64,
        _low: u64,
        _high: u64,
        _count: u64,
    ) -> grouphead::Result<bool> {
        Err(unsupported(Command::UpdateDown))
    }

    async fn adm_create_group(&self, group: &Bytes) -> AdmStatus {
        if grouphead::is_valid_group(group) {
            AdmStatus::Exists
        } else {
            AdmStatus::Invalid
        }
    }
}

impl<H: GroupHead> GroupHead for Arc<H> {
    fn move_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send {
        (**self).move_down(group)
    }

    fn get_down(&self, group: &Bytes) -> impl Future<Output = grouphead::Result<u64>> + Send {
        (**self).get_down(group)
    }

    fn update_down(
        &self,
        group: &Bytes,
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> impl Future<Output = grouphead::Result<bool>> + Send {
        (**self).update_down(group, old_high, low, high, count)
    }

    fn adm_create_group(&self, group: &Bytes) -> impl Future<Output = AdmStatus> + Send {
        (**self).adm_create_group(group)
    }
}

fn unsupported(command: Command) -> grouphead::Error {
    grouphead::Error::invalid(format!(
        "{} is not supported by the sharded allocator",
        String::from_utf8_lossy(command.name())
    ))
}

/// Answers protocol requests on one connection at a time.
pub struct GroupHeadServer<H> {
    head: H,
    max_groups: usize,
}

impl<H: GroupHead> GroupHeadServer<H> {
    pub fn new(head: H) -> Self {
        Self {
            head,
            max_groups: MAX_GROUPS,
        }
    }

    /// Refuses insert and revert requests naming more than `max_groups`
    /// groups. Values above [`MAX_GROUPS`] are clamped.
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups.min(MAX_GROUPS);
        self
    }

    pub const fn head(&self) -> &H {
        &self.head
    }

    /// Serves requests until the peer closes the stream or `shutdown` fires
    /// while waiting for the next request. Returns the number of requests
    /// answered.
    ///
    /// # Errors
    ///
    /// I/O failures, malformed requests and unknown commands end the
    /// connection with an error.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn serve<S>(&self, stream: S, shutdown: CancellationToken) -> Result<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufStream::new(stream);
        let mut served = 0;
        loop {
            let name = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                name = read_command(&mut stream) => name?,
            };
            let Some(name) = name else {
                break;
            };
            let Some(command) = Command::parse(&name) else {
                return Err(Error::protocol(format!(
                    "unknown command {:?}",
                    String::from_utf8_lossy(&name)
                )));
            };
            self.answer(command, &mut stream).await?;
            served += 1;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(served, "Connection finished");
        Ok(served)
    }

    async fn answer<S>(&self, command: Command, s: &mut BufStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match command {
            Command::GroupHeadInsert => {
                let n = s.read_u8().await? as usize;
                let mut groups = Vec::with_capacity(n);
                for _ in 0..n {
                    groups.push(read_field(s).await?);
                }
                let numbers = match self.check_size(n) {
                    Ok(()) => self.head.insert(&groups).await,
                    Err(e) => Err(e),
                };
                let numbers = match numbers {
                    Ok(numbers) => {
                        write_error(s, None).await?;
                        numbers
                    }
                    Err(e) => {
                        write_failure(s, command, &e).await?;
                        Vec::new()
                    }
                };
                let count = u8::try_from(numbers.len())
                    .map_err(|_| Error::protocol("allocator returned too many numbers"))?;
                s.write_u8(count).await?;
                for number in numbers {
                    s.write_u64(number).await?;
                }
            }
            Command::GroupHeadRevert => {
                let n = s.read_u8().await? as usize;
                let mut groups = Vec::with_capacity(n);
                let mut numbers = Vec::with_capacity(n);
                for _ in 0..n {
                    numbers.push(s.read_u64().await?);
                    groups.push(read_field(s).await?);
                }
                let res = match self.check_size(n) {
                    Ok(()) => self.head.revert(&groups, &numbers).await,
                    Err(e) => Err(e),
                };
                match res {
                    Ok(()) => write_error(s, None).await?,
                    Err(e) => write_failure(s, command, &e).await?,
                }
            }
            Command::MoveDown | Command::GetDown => {
                let group = read_field(s).await?;
                let res = if command == Command::MoveDown {
                    self.head.move_down(&group).await
                } else {
                    self.head.get_down(&group).await
                };
                let high = match res {
                    Ok(high) => {
                        write_error(s, None).await?;
                        high
                    }
                    Err(e) => {
                        write_failure(s, command, &e).await?;
                        0
                    }
                };
                s.write_u64(high).await?;
            }
            Command::UpdateDown => {
                let mut values = [0u64; 4];
                for value in &mut values {
                    *value = s.read_u64().await?;
                }
                let group = read_field(s).await?;
                let [old_high, low, high, count] = values;
                let ok = match self
                    .head
                    .update_down(&group, old_high, low, high, count)
                    .await
                {
                    Ok(ok) => {
                        write_error(s, None).await?;
                        ok
                    }
                    Err(e) => {
                        write_failure(s, command, &e).await?;
                        false
                    }
                };
                s.write_u8(if ok { UPDATE_OK } else { 0 }).await?;
            }
            Command::AdmCreateGroup => {
                let group = read_field(s).await?;
                let status = self.head.adm_create_group(&group).await;
                s.write_u8(status.code()).await?;
            }
        }
        s.flush().await?;
        Ok(())
    }

    fn check_size(&self, n: usize) -> grouphead::Result<()> {
        if n > self.max_groups {
            return Err(grouphead::Error::invalid(format!(
                "too many groups: {n} > {}",
                self.max_groups
            )));
        }
        Ok(())
    }
}

async fn write_failure<S>(s: &mut BufStream<S>, _command: Command, err: &grouphead::Error) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    #[cfg(feature = "tracing")]
    tracing::debug!(command = ?_command, "Request failed: {err}");
    write_error(s, Some(&err.to_string())).await
}
