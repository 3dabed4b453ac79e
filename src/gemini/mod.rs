//! Gemini protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Client connection
//!     → request.rs (read and validate the `<URL>\r\n` request line)
//!     → [proxy handler decides cache or upstream]
//!     → header.rs (encode `<STATUS> <META>\r\n`)
//!     → body bytes
//! ```
//!
//! # Design Decisions
//! - Only the single request / single response model is supported
//! - Limits follow the protocol: URL and meta are at most 1024 bytes
//! - Parsing is pure; I/O lives in `server` and `upstream`

pub mod header;
pub mod request;
pub mod status;

pub use header::ResponseHeader;
pub use request::parse_request_line;
pub use status::Status;

/// Default port for `gemini://` URLs without an explicit port.
pub const DEFAULT_PORT: u16 = 1965;

/// Maximum length of a request URL in bytes (excluding CRLF).
pub const MAX_URL_LEN: usize = 1024;

/// Maximum length of a response meta string in bytes.
pub const MAX_META_LEN: usize = 1024;

/// Errors raised while parsing Gemini protocol lines.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("request line exceeds {MAX_URL_LEN} bytes")]
    RequestTooLong,
    #[error("line is not terminated by CRLF")]
    MissingCrlf,
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("malformed status line: {0}")]
    MalformedHeader(String),
    #[error("meta exceeds {MAX_META_LEN} bytes")]
    MetaTooLong,
}
