//! Request handling subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → handler.rs: key = strategy.derive(target)
//!     → cache hit?  → replay body (marker or stored header first)
//!     → cache miss? → single-flight → fetch upstream
//!                   → status line → tee body to client + buffer
//!                   → close upstream → write buffer to cache
//!     → Outcome (logged, counted)
//! ```
//!
//! # Design Decisions
//! - Every handled error ends as one proxy-error status plus a log line
//! - Cache writes after a served response never change what the client saw
//! - Cancellation is checked between body chunks

pub mod handler;
pub mod sink;

pub use handler::{HandlerOptions, HitMode, Outcome, ProxyRequest, RequestHandler, CACHE_HIT_MARKER};
pub use sink::ResponseSink;
