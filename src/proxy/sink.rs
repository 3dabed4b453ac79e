//! Response sink abstraction.

use async_trait::async_trait;

use crate::gemini::Status;

/// Where the handler writes its response.
///
/// `write_status` is called at most once per request, before any body write.
#[async_trait]
pub trait ResponseSink: Send {
    async fn write_status(&mut self, status: Status, meta: &str) -> std::io::Result<()>;

    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Write all of `buf`, failing if the sink stops accepting bytes.
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            match self.write(remaining).await? {
                0 => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "response sink accepted no bytes",
                    ))
                }
                n => remaining = &remaining[n..],
            }
        }
        Ok(())
    }
}
