//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the cache directory
//! - Load TLS material and build the upstream client
//! - Wire the request handler and bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use std::path::Path;
use std::sync::Arc;

use crate::cache::{CacheError, DirectoryStore};
use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{self, TlsError};
use crate::proxy::{HandlerOptions, RequestHandler};
use crate::server::GeminiServer;
use crate::upstream::GeminiClient;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("preparing cache directory: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Build the request handler for `config`.
pub async fn build_handler(config: &ProxyConfig) -> Result<RequestHandler, StartupError> {
    let store = DirectoryStore::new(&config.cache.dir);
    store.ensure_root().await?;
    tracing::info!(
        dir = %config.cache.dir,
        key_strategy = ?config.cache.key_strategy,
        hit_mode = ?config.cache.hit_mode,
        "Cache ready"
    );

    let client = GeminiClient::new(&config.upstream)?;
    Ok(RequestHandler::new(
        Arc::new(store),
        Arc::new(client),
        HandlerOptions::from(config),
    ))
}

/// Run the proxy until `shutdown` fires.
pub async fn run(config: ProxyConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let handler = build_handler(&config).await?;

    let tls = &config.listener.tls;
    let acceptor = tls::load_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;

    let server = GeminiServer::new(Arc::new(handler), acceptor, &config);
    let listener = Listener::bind(&config.listener).await?;

    server.run(listener, shutdown).await?;
    Ok(())
}
