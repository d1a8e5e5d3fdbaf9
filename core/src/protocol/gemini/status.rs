/*
 * status.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Gemmule, a Gemini protocol client and server.
 *
 * Gemmule is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Gemmule is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Gemmule.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Gemini status codes: two digits, 10..=69. The tens digit selects one of six classes;
//! the unit digit only refines meaning inside its class.

use std::fmt;

use crate::protocol::gemini::error::{GeminiError, Result};

/// Status class, from the tens digit of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1x: meta is a prompt; repeat the request with the answer as query.
    Input,
    /// 2x: meta is a MIME type and a body follows.
    Success,
    /// 3x: meta is the new URL.
    Redirect,
    /// 4x: an identical request may succeed later.
    TemporaryFailure,
    /// 5x: identical requests will keep failing.
    PermanentFailure,
    /// 6x: a client certificate is required or was refused.
    CertificateRequired,
}

/// What the meta string of a class carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Prompt,
    MimeType,
    RedirectTarget,
    ErrorMessage,
    CertificateInfo,
}

impl StatusClass {
    /// Only successful responses carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, StatusClass::Success)
    }

    pub fn meta_kind(&self) -> MetaKind {
        match self {
            StatusClass::Input => MetaKind::Prompt,
            StatusClass::Success => MetaKind::MimeType,
            StatusClass::Redirect => MetaKind::RedirectTarget,
            StatusClass::TemporaryFailure | StatusClass::PermanentFailure => MetaKind::ErrorMessage,
            StatusClass::CertificateRequired => MetaKind::CertificateInfo,
        }
    }
}

/// Class from the tens digit. `code` must already be in 10..=69.
fn class_of_valid(code: u8) -> StatusClass {
    match code / 10 {
        1 => StatusClass::Input,
        2 => StatusClass::Success,
        3 => StatusClass::Redirect,
        4 => StatusClass::TemporaryFailure,
        5 => StatusClass::PermanentFailure,
        _ => StatusClass::CertificateRequired,
    }
}

/// Class of a raw code. Fails for anything outside 10..=69.
pub fn class_of(code: u8) -> Result<StatusClass> {
    if !(10..=69).contains(&code) {
        return Err(GeminiError::InvalidStatus(code.to_string()));
    }
    Ok(class_of_valid(code))
}

pub fn is_success(code: u8) -> bool {
    (20..30).contains(&code)
}

pub fn is_redirect(code: u8) -> bool {
    (30..40).contains(&code)
}

/// A valid two-digit Gemini status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u8);

impl StatusCode {
    pub const INPUT: StatusCode = StatusCode(10);
    /// As 10, but the answer should not be echoed (passwords).
    pub const SENSITIVE_INPUT: StatusCode = StatusCode(11);
    pub const SUCCESS: StatusCode = StatusCode(20);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(30);
    /// Clients may update bookmarks; indexers should forget the old URL.
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(31);
    pub const TEMPORARY_FAILURE: StatusCode = StatusCode(40);
    pub const SERVER_UNAVAILABLE: StatusCode = StatusCode(41);
    /// Dynamic content generator died or timed out.
    pub const CGI_ERROR: StatusCode = StatusCode(42);
    pub const PROXY_ERROR: StatusCode = StatusCode(43);
    /// Rate limited; meta is the number of seconds to wait.
    pub const SLOW_DOWN: StatusCode = StatusCode(44);
    pub const PERMANENT_FAILURE: StatusCode = StatusCode(50);
    pub const NOT_FOUND: StatusCode = StatusCode(51);
    pub const GONE: StatusCode = StatusCode(52);
    /// Request for a host this server does not serve, and proxying is refused.
    pub const PROXY_REQUEST_REFUSED: StatusCode = StatusCode(53);
    pub const BAD_REQUEST: StatusCode = StatusCode(59);
    pub const CLIENT_CERTIFICATE_REQUIRED: StatusCode = StatusCode(60);
    pub const CERTIFICATE_NOT_AUTHORIZED: StatusCode = StatusCode(61);
    pub const CERTIFICATE_NOT_VALID: StatusCode = StatusCode(62);

    pub fn new(code: u8) -> Result<Self> {
        class_of(code).map(|_| StatusCode(code))
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    pub fn class(&self) -> StatusClass {
        class_of_valid(self.0)
    }

    pub fn is_success(&self) -> bool {
        is_success(self.0)
    }

    pub fn is_redirect(&self) -> bool {
        is_redirect(self.0)
    }

    /// Name of an assigned code; None for reserved codes (e.g. 45, 58, 63).
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            10 => "input",
            11 => "sensitive input",
            20 => "success",
            30 => "temporary redirect",
            31 => "permanent redirect",
            40 => "temporary failure",
            41 => "server unavailable",
            42 => "CGI error",
            43 => "proxy error",
            44 => "slow down",
            50 => "permanent failure",
            51 => "not found",
            52 => "gone",
            53 => "proxy request refused",
            59 => "bad request",
            60 => "client certificate required",
            61 => "certificate not authorized",
            62 => "certificate not valid",
            _ => return None,
        };
        Some(name)
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = GeminiError;

    fn try_from(code: u8) -> Result<Self> {
        StatusCode::new(code)
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> u8 {
        status.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_follows_tens_digit() {
        for code in 10u8..=69 {
            let class = class_of(code).unwrap();
            let expected = match code / 10 {
                1 => StatusClass::Input,
                2 => StatusClass::Success,
                3 => StatusClass::Redirect,
                4 => StatusClass::TemporaryFailure,
                5 => StatusClass::PermanentFailure,
                _ => StatusClass::CertificateRequired,
            };
            assert_eq!(class, expected, "code {}", code);
            assert_eq!(StatusCode::new(code).unwrap().class(), class);
        }
    }

    #[test]
    fn code_and_raw_classification_agree_at_class_edges() {
        for code in [10u8, 19, 20, 29, 30, 39, 40, 49, 50, 59, 60, 69] {
            let status = StatusCode::try_from(code).unwrap();
            assert_eq!(status.class(), class_of(code).unwrap(), "code {}", code);
            assert_eq!(status.is_success(), status.class() == StatusClass::Success);
            assert_eq!(status.is_redirect(), status.class() == StatusClass::Redirect);
        }
    }

    #[test]
    fn out_of_range_codes_are_rejected() {
        for code in [0u8, 1, 9, 70, 99, 255] {
            assert!(matches!(class_of(code), Err(GeminiError::InvalidStatus(_))));
            assert!(StatusCode::new(code).is_err());
        }
    }

    #[test]
    fn reserved_codes_belong_to_their_class() {
        let s = StatusCode::new(45).unwrap();
        assert_eq!(s.class(), StatusClass::TemporaryFailure);
        assert_eq!(s.name(), None);
        assert_eq!(StatusCode::new(63).unwrap().class(), StatusClass::CertificateRequired);
    }

    #[test]
    fn predicates() {
        assert!(is_success(20));
        assert!(is_success(29));
        assert!(!is_success(30));
        assert!(is_redirect(31));
        assert!(!is_redirect(40));
        assert!(StatusCode::SUCCESS.is_success());
        assert!(StatusCode::PERMANENT_REDIRECT.is_redirect());
        assert!(!StatusCode::NOT_FOUND.is_success());
    }

    #[test]
    fn meta_kind_and_body() {
        assert!(StatusClass::Success.has_body());
        assert!(!StatusClass::Redirect.has_body());
        assert_eq!(StatusClass::Input.meta_kind(), MetaKind::Prompt);
        assert_eq!(StatusClass::Redirect.meta_kind(), MetaKind::RedirectTarget);
        assert_eq!(StatusClass::PermanentFailure.meta_kind(), MetaKind::ErrorMessage);
    }

    #[test]
    fn named_constants() {
        assert_eq!(StatusCode::SLOW_DOWN.code(), 44);
        assert_eq!(StatusCode::BAD_REQUEST.code(), 59);
        assert_eq!(StatusCode::CERTIFICATE_NOT_VALID.name(), Some("certificate not valid"));
        assert_eq!(StatusCode::NOT_FOUND.to_string(), "51");
    }
}
