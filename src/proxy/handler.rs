//! Cache-or-fetch request handler.
//!
//! # Responsibilities
//! - Derive the cache key for a request target
//! - Serve cache hits verbatim
//! - On a miss, fetch upstream and tee the body to the client and the cache
//! - Report failures to the requester as a single proxy-error status
//!
//! # Design Decisions
//! - No retries: a failed fetch is terminal for the request
//! - Client disconnects do not stop the cache fill; shutdown stops both
//! - A body that ends in a read error or cancellation is never cached

use std::net::SocketAddr;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use super::sink::ResponseSink;
use crate::cache::{CacheKey, CacheStore, Flight, Flights, KeyStrategy, StoredMeta};
use crate::config::ProxyConfig;
use crate::gemini::Status;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::upstream::{Fetch, UpstreamResponse};

/// Line written ahead of a cached body in [`HitMode::Marker`].
pub const CACHE_HIT_MARKER: &[u8] = b"!!! cached !!!\n";

/// Upstream body read size.
const CHUNK_SIZE: usize = 16 * 1024;

/// How a cache hit is rendered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitMode {
    /// Marker line, then the body. The original status is not replayed.
    #[default]
    Marker,
    /// Stored status and meta, then the body. Falls back to `Marker` when
    /// the entry has no stored header.
    Replay,
}

/// Tunables for [`RequestHandler`].
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub key_strategy: KeyStrategy,
    pub hit_mode: HitMode,
    /// Only cache `2x` responses.
    pub success_only: bool,
    /// Longest wait for the next upstream body chunk.
    pub body_idle_timeout: Duration,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for HandlerOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            key_strategy: config.cache.key_strategy,
            hit_mode: config.cache.hit_mode,
            success_only: config.cache.success_only,
            body_idle_timeout: Duration::from_secs(config.upstream.body_idle_timeout_secs),
        }
    }
}

/// One inbound request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target: String,
    pub peer: SocketAddr,
}

impl ProxyRequest {
    pub fn new(target: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            target: target.into(),
            peer,
        }
    }
}

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ServedFromCache,
    ServedFromUpstream,
    Failed,
    /// Shutdown interrupted the request.
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ServedFromCache => "cache",
            Outcome::ServedFromUpstream => "upstream",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// How the upstream body stream ended.
enum BodyEnd {
    Complete(Vec<u8>),
    /// Client gone and nothing to cache.
    Abandoned,
    Cancelled,
    ReadFailed(io::Error),
}

/// Serves requests from the cache or from upstream.
pub struct RequestHandler {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetch>,
    flights: Flights,
    options: HandlerOptions,
}

impl RequestHandler {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetch>, options: HandlerOptions) -> Self {
        Self {
            store,
            fetcher,
            flights: Flights::new(),
            options,
        }
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Handle one request, writing the response to `sink`.
    ///
    /// `cancel` is polled between I/O steps; once it fires the handler stops
    /// without writing anything further.
    pub async fn handle(
        &self,
        request: &ProxyRequest,
        sink: &mut dyn ResponseSink,
        cancel: &mut ShutdownSignal,
    ) -> Outcome {
        tracing::info!(target_url = %request.target, peer = %request.peer, "Request started");

        let key = self.options.key_strategy.derive(&request.target);
        tracing::debug!(cache_key = %key, "Cache key computed");

        let outcome = self.resolve(request, &key, sink, cancel).await;

        metrics::record_request(outcome.as_str());
        tracing::info!(
            target_url = %request.target,
            cache_key = %key,
            outcome = outcome.as_str(),
            "Request finished"
        );
        outcome
    }

    async fn resolve(
        &self,
        request: &ProxyRequest,
        key: &CacheKey,
        sink: &mut dyn ResponseSink,
        cancel: &mut ShutdownSignal,
    ) -> Outcome {
        loop {
            if self.store.exists(key).await {
                metrics::record_cache_lookup("hit");
                return self.serve_cached(key, sink).await;
            }

            match self.flights.join(key) {
                Flight::Leader(guard) => {
                    // A previous leader may have finished between lookup and join.
                    if self.store.exists(key).await {
                        drop(guard);
                        metrics::record_cache_lookup("hit");
                        return self.serve_cached(key, sink).await;
                    }
                    metrics::record_cache_lookup("miss");
                    let outcome = self.fetch_and_store(request, key, sink, cancel).await;
                    drop(guard);
                    return outcome;
                }
                Flight::Follower(waiter) => {
                    tracing::debug!(
                        cache_key = %key,
                        in_flight = self.flights.in_flight(),
                        "Waiting for in-flight fetch"
                    );
                    tokio::select! {
                        _ = waiter.wait() => {}
                        _ = cancel.recv() => return Outcome::Cancelled,
                    }
                }
            }
        }
    }

    async fn serve_cached(&self, key: &CacheKey, sink: &mut dyn ResponseSink) -> Outcome {
        let body = match self.store.read(key).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "Cache read failed");
                proxy_error(sink, &e.to_string()).await;
                return Outcome::Failed;
            }
        };

        let stored = match self.options.hit_mode {
            HitMode::Replay => self
                .store
                .read_meta(key)
                .await
                .and_then(|m| m.status().map(|status| (status, m.meta))),
            HitMode::Marker => None,
        };

        let header = match stored {
            Some((status, meta)) => sink.write_status(status, &meta).await,
            None => sink.write_all(CACHE_HIT_MARKER).await,
        };
        let written = match header {
            Ok(()) => sink.write_all(&body).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(cache_key = %key, error = %e, "Client went away during cached response");
        }

        Outcome::ServedFromCache
    }

    async fn fetch_and_store(
        &self,
        request: &ProxyRequest,
        key: &CacheKey,
        sink: &mut dyn ResponseSink,
        cancel: &mut ShutdownSignal,
    ) -> Outcome {
        let started = Instant::now();
        let fetched = tokio::select! {
            result = self.fetcher.fetch(&request.target) => result,
            _ = cancel.recv() => {
                tracing::info!(target_url = %request.target, "Cancelled before upstream responded");
                return Outcome::Cancelled;
            }
        };

        let mut response = match fetched {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(target_url = %request.target, error = %e, "Upstream fetch failed");
                metrics::record_upstream_error();
                proxy_error(sink, &e.to_string()).await;
                return Outcome::Failed;
            }
        };
        metrics::record_fetch_duration(started);

        let status = response.status;
        let meta = response.meta.clone();
        let cacheable = status.is_success() || !self.options.success_only;

        let mut client_open = match sink.write_status(status, &meta).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Client write failed on status line");
                false
            }
        };

        let end = stream_body(
            &mut response,
            sink,
            &mut client_open,
            cacheable,
            self.options.body_idle_timeout,
            cancel,
        )
        .await;
        response.close();

        match end {
            BodyEnd::Complete(buffer) => {
                if cacheable {
                    self.store_entry(key, status, &meta, &buffer).await;
                } else {
                    tracing::debug!(cache_key = %key, status = %status, "Response not cacheable");
                }
                Outcome::ServedFromUpstream
            }
            BodyEnd::Abandoned => Outcome::ServedFromUpstream,
            BodyEnd::Cancelled => {
                tracing::info!(target_url = %request.target, "Cancelled during upstream body");
                Outcome::Cancelled
            }
            BodyEnd::ReadFailed(e) => {
                tracing::warn!(target_url = %request.target, error = %e, "Upstream body interrupted; not caching");
                metrics::record_upstream_error();
                Outcome::Failed
            }
        }
    }

    async fn store_entry(&self, key: &CacheKey, status: Status, meta: &str, body: &[u8]) {
        match self
            .store
            .write_entry(key, &StoredMeta::new(status, meta), body)
            .await
        {
            Ok(()) => tracing::info!(cache_key = %key, bytes = body.len(), "Response cached"),
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "Writing cache entry failed");
                metrics::record_cache_write_error();
            }
        }
    }
}

async fn proxy_error(sink: &mut dyn ResponseSink, message: &str) {
    if let Err(e) = sink.write_status(Status::PROXY_ERROR, message).await {
        tracing::debug!(error = %e, "Client went away before proxy error");
    }
}

/// Copy the upstream body to the client and, when `cacheable`, into a buffer.
///
/// A read that makes no progress within `idle_timeout` ends the stream as
/// a read failure.
async fn stream_body(
    response: &mut UpstreamResponse,
    sink: &mut dyn ResponseSink,
    client_open: &mut bool,
    cacheable: bool,
    idle_timeout: Duration,
    cancel: &mut ShutdownSignal,
) -> BodyEnd {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.recv() => return BodyEnd::Cancelled,
            read = tokio::time::timeout(idle_timeout, response.body.read(&mut chunk)) => {
                read.unwrap_or_else(|_| {
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("upstream body idle for {}s", idle_timeout.as_secs_f64()),
                    ))
                })
            }
        };
        let n = match read {
            Ok(0) => return BodyEnd::Complete(buffer),
            Ok(n) => n,
            Err(e) => return BodyEnd::ReadFailed(e),
        };
        let bytes = &chunk[..n];

        if cacheable {
            buffer.extend_from_slice(bytes);
        }

        if *client_open {
            let written = tokio::select! {
                biased;
                _ = cancel.recv() => return BodyEnd::Cancelled,
                written = sink.write_all(bytes) => written,
            };
            if let Err(e) = written {
                *client_open = false;
                tracing::warn!(error = %e, "Client write failed; continuing to fill cache");
            }
        }

        if !*client_open && !cacheable {
            return BodyEnd::Abandoned;
        }
    }
}
