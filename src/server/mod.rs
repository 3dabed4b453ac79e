//! Gemini server subsystem.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → accept.rs (spawn per connection, TLS handshake, drain on shutdown)
//!     → session.rs (read request line, validate, invoke RequestHandler)
//!     → ConnectionSink (header line once, then body)
//!     → close connection
//! ```

pub mod accept;
pub mod session;

pub use accept::GeminiServer;
pub use session::{serve_connection, ConnectionSink, SessionLimits};
