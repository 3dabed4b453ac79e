//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (TLS handshake, mandatory for Gemini)
//!     → connection.rs (lifecycle tracking for graceful drain)
//!     → line.rs (bounded CRLF line reads)
//!     → Hand off to the server layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Line reads are length-capped before any parsing

pub mod connection;
pub mod line;
pub mod listener;
pub mod tls;

pub use line::read_line;
pub use listener::Listener;
