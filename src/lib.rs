//! Caching Gemini proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client request          ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ net::listener ─▶ net::tls ─▶ server        │
//!                             │                                  │           │
//!                             │                                  ▼           │
//!                             │                         proxy::handler       │
//!                             │                        │              │      │
//!                             │             cache hit  ▼              ▼ miss │
//!                             │                 cache::store    upstream ────┼──▶ Origin
//!                             │                        ▲              │      │
//!                             │                        └── tee body ──┘      │
//!     Client response         │                                  │           │
//!     ◀───────────────────────┼──────────────────────────────────┘           │
//!                             │                                              │
//!                             │  config · observability · lifecycle          │
//!                             └──────────────────────────────────────────────┘
//! ```

// Core
pub mod cache;
pub mod gemini;
pub mod proxy;
pub mod upstream;

// Network front end
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::RequestHandler;
pub use server::GeminiServer;
