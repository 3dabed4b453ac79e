//! Response header line (`<STATUS> <META>\r\n`).

use super::{ProtocolError, Status, MAX_META_LEN};

/// Parsed response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: Status,
    pub meta: String,
}

impl ResponseHeader {
    pub fn new(status: Status, meta: impl Into<String>) -> Self {
        Self {
            status,
            meta: meta.into(),
        }
    }

    /// Parse a header line. The line must include its trailing CRLF.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let line = line
            .strip_suffix(b"\r\n")
            .ok_or(ProtocolError::MissingCrlf)?;
        let line = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;

        let (code, meta) = match line.split_once(' ') {
            Some((code, meta)) => (code, meta),
            None => (line, ""),
        };

        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::MalformedHeader(line.to_string()));
        }
        let status = code
            .parse::<u8>()
            .ok()
            .and_then(Status::from_code)
            .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;

        if meta.len() > MAX_META_LEN {
            return Err(ProtocolError::MetaTooLong);
        }

        Ok(Self::new(status, meta))
    }

    /// Encode as a wire line.
    ///
    /// Meta longer than the protocol limit is truncated on a char boundary,
    /// and embedded line breaks are replaced so the header stays one line.
    pub fn encode(&self) -> Vec<u8> {
        let mut meta: String = self
            .meta
            .chars()
            .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
            .collect();
        if meta.len() > MAX_META_LEN {
            let mut end = MAX_META_LEN;
            while !meta.is_char_boundary(end) {
                end -= 1;
            }
            meta.truncate(end);
        }
        format!("{} {}\r\n", self.status, meta).into_bytes()
    }
}
