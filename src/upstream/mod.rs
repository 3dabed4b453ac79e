//! Upstream (origin) fetch subsystem.
//!
//! # Data Flow
//! ```text
//! request target
//!     → client.rs (TCP connect → TLS → send URL → parse header)
//!     → UpstreamResponse (status, meta, body stream)
//!     → consumed and closed by the request handler
//! ```
//!
//! # Design Decisions
//! - The handler depends only on the `Fetch` trait, never on the wire format
//! - No retries here; a failed fetch is reported once to the requester
//! - Every network step has a deadline

pub mod client;

use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::gemini::{ProtocolError, Status};

pub use client::GeminiClient;

/// Readable body of an upstream response.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// Errors from fetching an upstream document.
///
/// The `Display` text is forwarded to the requester as proxy-error meta.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tls handshake with {host}: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("upstream protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Capability to fetch a document from its origin.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, target: &str) -> Result<UpstreamResponse, FetchError>;
}

/// Status, meta and body of one upstream response.
///
/// The body is released when the response is closed or dropped.
pub struct UpstreamResponse {
    pub status: Status,
    pub meta: String,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn new(status: Status, meta: impl Into<String>, body: BodyStream) -> Self {
        Self {
            status,
            meta: meta.into(),
            body,
        }
    }

    /// Release the underlying stream.
    pub fn close(self) {
        drop(self.body);
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
