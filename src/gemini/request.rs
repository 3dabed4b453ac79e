//! Request line parsing.

use url::Url;

use super::{ProtocolError, MAX_URL_LEN};

/// Parse a request line (`<URL>\r\n`) into an absolute URL.
pub fn parse_request_line(line: &[u8]) -> Result<Url, ProtocolError> {
    let line = match line.strip_suffix(b"\r\n") {
        Some(line) => line,
        // Truncated by the reader's limit before a terminator arrived.
        None if line.len() > MAX_URL_LEN => return Err(ProtocolError::RequestTooLong),
        None => return Err(ProtocolError::MissingCrlf),
    };
    if line.len() > MAX_URL_LEN {
        return Err(ProtocolError::RequestTooLong);
    }
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;

    Url::parse(line).map_err(|e| ProtocolError::InvalidUrl(e.to_string()))
}
