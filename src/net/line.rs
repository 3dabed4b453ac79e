//! Bounded line reads.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Read up to and including the first `\n`, consuming at most `limit` bytes.
///
/// The returned buffer ends with `\n` unless the limit was hit or the
/// stream ended first; callers validate the terminator.
pub async fn read_line<R>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    (&mut *reader).take(limit as u64).read_until(b'\n', &mut line).await?;
    Ok(line)
}
