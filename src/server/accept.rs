//! Accept loop and per-connection tasks.
//!
//! # Responsibilities
//! - Accept connections within the listener's connection limit
//! - Run the TLS handshake under a deadline
//! - Hand each connection to the request handler in its own task
//! - Stop accepting on shutdown and drain in-flight connections

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use super::session::{serve_connection, SessionLimits};
use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::proxy::RequestHandler;

/// Pause after a failed accept so persistent errors (e.g. fd exhaustion) do not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Gemini front end of the caching proxy.
pub struct GeminiServer {
    handler: Arc<RequestHandler>,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    limits: SessionLimits,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl GeminiServer {
    pub fn new(handler: Arc<RequestHandler>, acceptor: TlsAcceptor, config: &ProxyConfig) -> Self {
        Self {
            handler,
            acceptor,
            handshake_timeout: Duration::from_secs(config.listener.handshake_timeout_secs),
            limits: SessionLimits {
                request_timeout: Duration::from_secs(config.listener.request_timeout_secs),
            },
            drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve until `shutdown` fires, then wait for in-flight connections.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "Gemini server starting"
        );

        let mut signal = shutdown.subscribe();
        loop {
            let (stream, peer, permit) = tokio::select! {
                _ = signal.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            let guard = self.tracker.track();
            let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
            let handler = Arc::clone(&self.handler);
            let acceptor = self.acceptor.clone();
            let handshake_timeout = self.handshake_timeout;
            let limits = self.limits;
            let mut cancel = shutdown.subscribe();

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;

                    let tls = match timeout(handshake_timeout, acceptor.accept(stream)).await {
                        Ok(Ok(tls)) => tls,
                        Ok(Err(e)) => {
                            tracing::debug!(error = %e, "TLS handshake failed");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!("TLS handshake timed out");
                            return;
                        }
                    };

                    if let Err(e) = serve_connection(&handler, tls, peer, limits, &mut cancel).await {
                        tracing::debug!(error = %e, "Connection ended with error");
                    }
                }
                .instrument(span),
            );
        }

        tracing::info!(
            active = self.tracker.active_count(),
            free_slots = listener.available_permits(),
            "Stopped accepting, draining connections"
        );
        if timeout(self.drain_timeout, self.tracker.drained()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed"
            );
        }

        tracing::info!("Gemini server stopped");
        Ok(())
    }
}
