use super::{Error, MAX_ERROR_LEN, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads a NUL-terminated command name. `None` on a clean end of stream.
pub(crate) async fn read_command<R>(r: &mut R) -> Result<Option<Bytes>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if r.read_until(0, &mut buf).await? == 0 {
        return Ok(None);
    }
    finish_field(buf).map(Some)
}

/// Reads one NUL-terminated field, without its terminator.
pub(crate) async fn read_field<R>(r: &mut R) -> Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    r.read_until(0, &mut buf).await?;
    finish_field(buf)
}

fn finish_field(mut buf: Vec<u8>) -> Result<Bytes> {
    if buf.pop() != Some(0) {
        return Err(Error::protocol("stream ended inside a field"));
    }
    Ok(Bytes::from(buf))
}

/// Reads an error field. `None` when it is empty.
pub(crate) async fn read_error<R>(r: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let raw = read_field(r).await?;
    Ok((!raw.is_empty()).then(|| String::from_utf8_lossy(&raw).into_owned()))
}

pub(crate) async fn write_field<W>(w: &mut W, field: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(field).await?;
    w.write_u8(0).await?;
    Ok(())
}

/// Writes an error field; `None` writes the empty success marker.
pub(crate) async fn write_error<W>(w: &mut W, err: Option<&str>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let raw = err.map(error_bytes).unwrap_or_default();
    write_field(w, &raw).await
}

/// An error message as sent on the wire: NUL bytes dropped, cut at
/// [`MAX_ERROR_LEN`] bytes.
pub(crate) fn error_bytes(message: &str) -> Vec<u8> {
    message
        .bytes()
        .filter(|&b| b != 0)
        .take(MAX_ERROR_LEN)
        .collect()
}

/// Refuses names the NUL-delimited framing cannot carry.
pub(crate) fn check_group(group: &[u8]) -> Result<()> {
    if group.contains(&0) {
        return Err(Error::protocol(format!(
            "group {:?} contains a NUL byte",
            String::from_utf8_lossy(group)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn errors_are_cut_and_cleaned() {
        let long = "x".repeat(1000);
        assert_eq!(error_bytes(&long).len(), MAX_ERROR_LEN);
        assert_eq!(error_bytes("a\0b"), b"ab");
        assert!(error_bytes("").is_empty());
    }

    #[tokio::test]
    async fn fields_split_on_nul() {
        let mut r = BufReader::new(&b"MoveDown\0alt.test\0\0trailing"[..]);
        assert_eq!(read_command(&mut r).await.unwrap().unwrap(), &b"MoveDown"[..]);
        assert_eq!(read_field(&mut r).await.unwrap(), &b"alt.test"[..]);
        assert_eq!(read_error(&mut r).await.unwrap(), None);
        assert!(matches!(read_field(&mut r).await, Err(Error::Protocol { .. })));
        assert!(read_command(&mut r).await.unwrap().is_none());
    }

    #[test]
    fn nul_groups_are_refused() {
        assert!(check_group(b"alt.test").is_ok());
        assert!(check_group(b"").is_ok());
        assert!(matches!(check_group(b"alt\0test"), Err(Error::Protocol { .. })));
    }
}
