//! Client side of the remote allocator protocol.

use crate::{Command, Error, MAX_GROUPS, Result, UPDATE_OK, check_group, read_error, write_field};
use bytes::Bytes;
use grouphead::{AdmStatus, GroupAllocator};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream},
    net::{TcpStream, ToSocketAddrs},
    sync::{Mutex, MutexGuard},
};
#[cfg(feature = "tracing")]
use tracing::instrument;

struct Connection<S> {
    stream: BufStream<S>,
    broken: bool,
}

impl<S> Connection<S> {
    /// Ends an exchange. The connection stays broken unless the whole reply
    /// was read.
    fn settle<T>(&mut self, res: Result<T>) -> Result<T> {
        self.broken = res.is_err();
        res
    }
}

/// A [`GroupAllocator`] living in another process.
///
/// Requests on one connection are strictly sequential; concurrent callers
/// queue on an async lock. After an I/O or framing error, or when a call is
/// dropped before its reply has been read, the connection is out of step
/// with the server and every later call fails.
pub struct RemoteAllocator<S> {
    conn: Mutex<Connection<S>>,
}

impl RemoteAllocator<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

#[cfg(unix)]
impl RemoteAllocator<tokio::net::UnixStream> {
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(tokio::net::UnixStream::connect(path).await?))
    }
}

impl<S> RemoteAllocator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            conn: Mutex::new(Connection {
                stream: BufStream::new(stream),
                broken: false,
            }),
        }
    }

    /// Whether an earlier failure left the connection unusable.
    pub async fn is_broken(&self) -> bool {
        self.conn.lock().await.broken
    }

    /// Allocates one number per group on the remote side.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(groups = groups.len())))]
    pub async fn insert_groups(&self, groups: &[Bytes]) -> Result<Vec<u64>> {
        check_batch(groups)?;
        let mut conn = self.lock().await?;
        let res = exchange_insert(&mut conn.stream, groups).await;
        let (err, numbers) = conn.settle(res)?;
        remote(err)?;
        if numbers.len() != groups.len() {
            return Err(Error::protocol(format!(
                "asked for {} numbers, got {}",
                groups.len(),
                numbers.len()
            )));
        }
        Ok(numbers)
    }

    /// Gives `numbers[i]` back to `groups[i]` on the remote side.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(groups = groups.len())))]
    pub async fn revert_groups(&self, groups: &[Bytes], numbers: &[u64]) -> Result<()> {
        check_batch(groups)?;
        if groups.len() != numbers.len() {
            return Err(Error::protocol(format!(
                "length mismatch {} != {}",
                groups.len(),
                numbers.len()
            )));
        }
        let mut conn = self.lock().await?;
        let res = exchange_revert(&mut conn.stream, groups, numbers).await;
        remote(conn.settle(res)?)
    }

    pub async fn move_down(&self, group: &[u8]) -> Result<u64> {
        self.high_water(Command::MoveDown, group).await
    }

    pub async fn get_down(&self, group: &[u8]) -> Result<u64> {
        self.high_water(Command::GetDown, group).await
    }

    pub async fn update_down(
        &self,
        group: &[u8],
        old_high: u64,
        low: u64,
        high: u64,
        count: u64,
    ) -> Result<bool> {
        check_group(group)?;
        let mut conn = self.lock().await?;
        let res = exchange_update(&mut conn.stream, group, [old_high, low, high, count]).await;
        let (err, ok) = conn.settle(res)?;
        remote(err)?;
        Ok(ok)
    }

    /// Creates a group on the remote side. Transport failures read as
    /// [`AdmStatus::BackendError`].
    pub async fn adm_create_group(&self, group: &[u8]) -> AdmStatus {
        if check_group(group).is_err() {
            return AdmStatus::Invalid;
        }
        let status = match self.lock().await {
            Ok(mut conn) => {
                let res = exchange_create(&mut conn.stream, group).await;
                conn.settle(res)
            }
            Err(e) => Err(e),
        };
        match status {
            Ok(code) => AdmStatus::from_code(code),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("AdmCreateGroup failed: {_e}");
                AdmStatus::BackendError
            }
        }
    }

    async fn high_water(&self, command: Command, group: &[u8]) -> Result<u64> {
        check_group(group)?;
        let mut conn = self.lock().await?;
        let res = exchange_high_water(&mut conn.stream, command, group).await;
        let (err, high) = conn.settle(res)?;
        remote(err)?;
        Ok(high)
    }

    /// Starts an exchange. Until [`Connection::settle`] runs, the connection
    /// counts as broken, so a cancelled call cannot leave a stale reply for
    /// the next one.
    async fn lock(&self) -> Result<MutexGuard<'_, Connection<S>>> {
        let mut conn = self.conn.lock().await;
        if conn.broken {
            return Err(Error::protocol("connection is out of sync"));
        }
        conn.broken = true;
        Ok(conn)
    }
}

impl<S> GroupAllocator for RemoteAllocator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn insert(&self, groups: &[Bytes]) -> grouphead::Result<Vec<u64>> {
        Ok(self.insert_groups(groups).await?)
    }

    async fn revert(&self, groups: &[Bytes], numbers: &[u64]) -> grouphead::Result<()> {
        Ok(self.revert_groups(groups, numbers).await?)
    }
}

async fn exchange_insert<S>(s: &mut BufStream<S>, groups: &[Bytes]) -> Result<(Option<String>, Vec<u64>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(s, Command::GroupHeadInsert.name()).await?;
    s.write_u8(groups.len() as u8).await?;
    for group in groups {
        write_field(s, group).await?;
    }
    s.flush().await?;

    let err = read_error(s).await?;
    let n = s.read_u8().await? as usize;
    let mut numbers = Vec::with_capacity(n);
    for _ in 0..n {
        numbers.push(s.read_u64().await?);
    }
    Ok((err, numbers))
}

async fn exchange_revert<S>(s: &mut BufStream<S>, groups: &[Bytes], numbers: &[u64]) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(s, Command::GroupHeadRevert.name()).await?;
    s.write_u8(groups.len() as u8).await?;
    for (group, &number) in groups.iter().zip(numbers) {
        s.write_u64(number).await?;
        write_field(s, group).await?;
    }
    s.flush().await?;
    read_error(s).await
}

async fn exchange_high_water<S>(
    s: &mut BufStream<S>,
    command: Command,
    group: &[u8],
) -> Result<(Option<String>, u64)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(s, command.name()).await?;
    write_field(s, group).await?;
    s.flush().await?;
    let err = read_error(s).await?;
    Ok((err, s.read_u64().await?))
}

async fn exchange_update<S>(s: &mut BufStream<S>, group: &[u8], values: [u64; 4]) -> Result<(Option<String>, bool)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(s, Command::UpdateDown.name()).await?;
    for value in values {
        s.write_u64(value).await?;
    }
    write_field(s, group).await?;
    s.flush().await?;
    let err = read_error(s).await?;
    Ok((err, s.read_u8().await? == UPDATE_OK))
}

async fn exchange_create<S>(s: &mut BufStream<S>, group: &[u8]) -> Result<u8>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(s, Command::AdmCreateGroup.name()).await?;
    write_field(s, group).await?;
    s.flush().await?;
    Ok(s.read_u8().await?)
}

fn check_batch(groups: &[Bytes]) -> Result<()> {
    if groups.len() > MAX_GROUPS {
        return Err(Error::protocol(format!("too many groups: {}", groups.len())));
    }
    groups.iter().try_for_each(|g| check_group(g))
}

fn remote(err: Option<String>) -> Result<()> {
    match err {
        None => Ok(()),
        Some(message) => Err(Error::Remote { message }),
    }
}
