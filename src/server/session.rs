//! One request/response exchange on an established connection.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::gemini::{parse_request_line, ResponseHeader, Status, MAX_URL_LEN};
use crate::lifecycle::ShutdownSignal;
use crate::net::read_line;
use crate::proxy::{Outcome, ProxyRequest, RequestHandler, ResponseSink};

/// Meta sent when the handler writes body bytes without a status line.
pub const DEFAULT_META: &str = "text/gemini";

/// Per-connection deadlines.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Time allowed for the client to send its request line.
    pub request_timeout: Duration,
}

/// [`ResponseSink`] over a client connection.
///
/// The header line is written at most once. Body bytes written before any
/// status get a `20 text/gemini` header first.
pub struct ConnectionSink<W> {
    writer: W,
    header_sent: bool,
}

impl<W> ConnectionSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_sent: false,
        }
    }

    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Flush and close the write side.
    pub async fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }
}

#[async_trait]
impl<W> ResponseSink for ConnectionSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_status(&mut self, status: Status, meta: &str) -> std::io::Result<()> {
        if self.header_sent {
            return Err(std::io::Error::other("status line already written"));
        }
        self.header_sent = true;
        self.writer
            .write_all(&ResponseHeader::new(status, meta).encode())
            .await
    }

    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.header_sent {
            self.write_status(Status::SUCCESS, DEFAULT_META).await?;
        }
        self.writer.write(buf).await
    }
}

/// Serve one request on `io` and close it.
///
/// Returns `None` when the connection closed before a valid request arrived.
pub async fn serve_connection<IO>(
    handler: &RequestHandler,
    io: IO,
    peer: SocketAddr,
    limits: SessionLimits,
    cancel: &mut ShutdownSignal,
) -> std::io::Result<Option<Outcome>>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (reader, writer) = tokio::io::split(io);
    let mut reader = BufReader::new(reader);
    let mut sink = ConnectionSink::new(writer);

    let line = match tokio::time::timeout(
        limits.request_timeout,
        read_line(&mut reader, MAX_URL_LEN + 2),
    )
    .await
    {
        Ok(line) => line?,
        Err(_) => {
            tracing::debug!(peer = %peer, "Timed out waiting for request line");
            return Ok(None);
        }
    };
    if line.is_empty() {
        return Ok(None);
    }

    let url = match parse_request_line(&line) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Rejected malformed request");
            sink.write_status(Status::BAD_REQUEST, &e.to_string()).await?;
            sink.finish().await?;
            return Ok(None);
        }
    };

    if url.scheme() != "gemini" {
        tracing::warn!(peer = %peer, scheme = url.scheme(), "Refused non-gemini request");
        sink.write_status(Status::PROXY_REQUEST_REFUSED, "only gemini:// URLs are proxied")
            .await?;
        sink.finish().await?;
        return Ok(None);
    }

    let request = ProxyRequest::new(url.as_str(), peer);
    let outcome = handler.handle(&request, &mut sink, cancel).await;

    if let Err(e) = sink.finish().await {
        tracing::debug!(peer = %peer, error = %e, "Closing connection failed");
    }
    Ok(Some(outcome))
}
