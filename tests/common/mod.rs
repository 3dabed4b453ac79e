//! Shared fakes for handler and connection tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use gemcache::cache::{CacheError, CacheKey, CacheStore, DirectoryStore, KeyStrategy, StoredMeta};
use gemcache::gemini::Status;
use gemcache::proxy::{HandlerOptions, RequestHandler, ResponseSink};
use gemcache::upstream::{Fetch, FetchError, UpstreamResponse};

pub const TARGET: &str = "gemini://example.org/page";

pub fn peer() -> SocketAddr {
    "127.0.0.1:50000".parse().unwrap()
}

/// Options matching the original on-disk naming (`gemini---example.org-page`).
pub fn sanitize_options() -> HandlerOptions {
    HandlerOptions {
        key_strategy: KeyStrategy::Sanitize,
        ..HandlerOptions::default()
    }
}

pub fn handler_with_store(
    store: Arc<dyn CacheStore>,
    fetcher: Arc<MockFetcher>,
    options: HandlerOptions,
) -> RequestHandler {
    RequestHandler::new(store, fetcher, options)
}

pub fn handler(dir: &Path, fetcher: Arc<MockFetcher>, options: HandlerOptions) -> RequestHandler {
    handler_with_store(Arc::new(DirectoryStore::new(dir)), fetcher, options)
}

/// Names of all files in `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// How a [`TestBody`] behaves once its data runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEnding {
    Eof,
    /// Return an I/O error instead of EOF.
    Error,
    /// Never resolve again.
    Stall,
}

/// Upstream body that records when it is released.
pub struct TestBody {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    ending: BodyEnding,
    released: Arc<AtomicBool>,
}

impl AsyncRead for TestBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos < self.data.len() {
            let end = self
                .pos
                .saturating_add(self.chunk)
                .min(self.data.len())
                .min(self.pos + buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..end]);
            self.pos = end;
            return Poll::Ready(Ok(()));
        }
        match self.ending {
            BodyEnding::Eof => Poll::Ready(Ok(())),
            BodyEnding::Error => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upstream reset",
            ))),
            BodyEnding::Stall => Poll::Pending,
        }
    }
}

impl Drop for TestBody {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Scripted upstream response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: Status,
    pub meta: String,
    pub body: Vec<u8>,
    pub chunk: usize,
    pub ending: BodyEnding,
}

impl Reply {
    pub fn ok(meta: &str, body: &[u8]) -> Self {
        Self::status(Status::SUCCESS, meta, body)
    }

    pub fn status(status: Status, meta: &str, body: &[u8]) -> Self {
        Self {
            status,
            meta: meta.to_string(),
            body: body.to_vec(),
            chunk: usize::MAX,
            ending: BodyEnding::Eof,
        }
    }

    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn ending(mut self, ending: BodyEnding) -> Self {
        self.ending = ending;
        self
    }
}

/// Fetch capability driven by a fixed reply or error message.
pub struct MockFetcher {
    reply: Result<Reply, (io::ErrorKind, String)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl MockFetcher {
    pub fn replying(reply: Reply) -> Arc<Self> {
        Arc::new(Self::new(Ok(reply), None))
    }

    pub fn failing(kind: io::ErrorKind, message: &str) -> Arc<Self> {
        Arc::new(Self::new(Err((kind, message.to_string())), None))
    }

    pub fn slow(reply: Result<Reply, (io::ErrorKind, String)>, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(reply, Some(delay)))
    }

    fn new(reply: Result<Reply, (io::ErrorKind, String)>, delay: Option<Duration>) -> Self {
        Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once the most recent response body has been dropped.
    pub fn body_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, _target: &str) -> Result<UpstreamResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(reply) => {
                self.released.store(false, Ordering::SeqCst);
                let body = TestBody {
                    data: reply.body.clone(),
                    pos: 0,
                    chunk: reply.chunk,
                    ending: reply.ending,
                    released: Arc::clone(&self.released),
                };
                Ok(UpstreamResponse::new(reply.status, reply.meta.clone(), Box::new(body)))
            }
            Err((kind, message)) => Err(FetchError::Io(io::Error::new(*kind, message.clone()))),
        }
    }
}

/// Response sink that records everything written to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub status: Option<(Status, String)>,
    pub status_writes: usize,
    pub body: Vec<u8>,
    /// Fail every write once this many body bytes have been accepted.
    pub fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(bytes: usize) -> Self {
        Self {
            fail_after: Some(bytes),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn write_status(&mut self, status: Status, meta: &str) -> io::Result<()> {
        self.status_writes += 1;
        self.status = Some((status, meta.to_string()));
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let allowed = match self.fail_after {
            Some(limit) if self.body.len() >= limit => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            }
            Some(limit) => buf.len().min(limit - self.body.len()),
            None => buf.len(),
        };
        self.body.extend_from_slice(&buf[..allowed]);
        Ok(allowed)
    }
}

/// Store whose entries vanish between `exists` and `read`.
pub struct VanishingStore {
    pub inner: DirectoryStore,
}

#[async_trait]
impl CacheStore for VanishingStore {
    async fn exists(&self, key: &CacheKey) -> bool {
        self.inner.exists(key).await
    }

    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        std::fs::remove_file(self.inner.entry_path(key)).unwrap();
        self.inner.read(key).await
    }

    async fn write(&self, key: &CacheKey, body: &[u8]) -> Result<(), CacheError> {
        self.inner.write(key, body).await
    }

    async fn write_entry(
        &self,
        key: &CacheKey,
        meta: &StoredMeta,
        body: &[u8],
    ) -> Result<(), CacheError> {
        self.inner.write_entry(key, meta, body).await
    }

    async fn read_meta(&self, key: &CacheKey) -> Option<StoredMeta> {
        self.inner.read_meta(key).await
    }
}
