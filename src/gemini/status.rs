//! Gemini status codes.

use std::fmt;

/// A two-digit Gemini response status.
///
/// The first digit is the category; unknown codes within a valid category are
/// preserved as-is so upstream responses are relayed unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Status(u8);

impl Status {
    pub const INPUT: Status = Status(10);
    pub const SENSITIVE_INPUT: Status = Status(11);
    pub const SUCCESS: Status = Status(20);
    pub const REDIRECT_TEMPORARY: Status = Status(30);
    pub const REDIRECT_PERMANENT: Status = Status(31);
    pub const TEMPORARY_FAILURE: Status = Status(40);
    pub const SERVER_UNAVAILABLE: Status = Status(41);
    pub const CGI_ERROR: Status = Status(42);
    pub const PROXY_ERROR: Status = Status(43);
    pub const SLOW_DOWN: Status = Status(44);
    pub const PERMANENT_FAILURE: Status = Status(50);
    pub const NOT_FOUND: Status = Status(51);
    pub const GONE: Status = Status(52);
    pub const PROXY_REQUEST_REFUSED: Status = Status(53);
    pub const BAD_REQUEST: Status = Status(59);
    pub const CLIENT_CERTIFICATE_REQUIRED: Status = Status(60);
    pub const CERTIFICATE_NOT_AUTHORISED: Status = Status(61);
    pub const CERTIFICATE_NOT_VALID: Status = Status(62);

    /// Build a status from its numeric code.
    ///
    /// Returns `None` for codes outside `10..=69`.
    pub fn from_code(code: u8) -> Option<Self> {
        if (10..=69).contains(&code) {
            Some(Self(code))
        } else {
            None
        }
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// First digit of the status.
    pub fn category(&self) -> u8 {
        self.0 / 10
    }

    pub fn is_input(&self) -> bool {
        self.category() == 1
    }

    pub fn is_success(&self) -> bool {
        self.category() == 2
    }

    pub fn is_redirect(&self) -> bool {
        self.category() == 3
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.category(), 4 | 5)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_codes() {
        assert_eq!(Status::from_code(9), None);
        assert_eq!(Status::from_code(70), None);
        assert_eq!(Status::from_code(43), Some(Status::PROXY_ERROR));
    }

    #[test]
    fn categories() {
        assert!(Status::SUCCESS.is_success());
        assert!(Status::from_code(21).unwrap().is_success());
        assert!(Status::REDIRECT_PERMANENT.is_redirect());
        assert!(Status::PROXY_ERROR.is_failure());
        assert!(Status::NOT_FOUND.is_failure());
        assert!(Status::SENSITIVE_INPUT.is_input());
        assert!(!Status::CLIENT_CERTIFICATE_REQUIRED.is_failure());
    }

    #[test]
    fn displays_two_digits() {
        assert_eq!(Status::SUCCESS.to_string(), "20");
        assert_eq!(Status::BAD_REQUEST.to_string(), "59");
    }
}
