// tandem - a SIP client transaction engine
// Copyright (C) 2026 Tandem Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use smol_str::SmolStr;

use crate::{headers::Headers, method::Method, version::SipVersion};

/// Errors raised when constructing message components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Status codes outside the SIP range 100-699.
    InvalidStatusCode { code: u16 },
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStatusCode { code } => {
                write!(f, "invalid SIP status code: {} (must be 100-699)", code)
            }
        }
    }
}

impl std::error::Error for MessageError {}

/// First line of a SIP request: `Method SP Request-URI SP SIP-Version`.
///
/// The request-URI is held as an opaque string; its grammar is the message
/// codec's concern, not the transaction layer's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    uri: SmolStr,
    version: SipVersion,
}

impl RequestLine {
    /// Creates a request line for the given method and target URI.
    ///
    /// Defaults to SIP/2.0 as the version.
    pub fn new(method: Method, uri: impl Into<SmolStr>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: SipVersion::V2,
        }
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &SmolStr {
        &self.uri
    }

    /// Returns the SIP version.
    pub fn version(&self) -> SipVersion {
        self.version
    }
}

/// First line of a SIP response: `SIP-Version SP Status-Code SP Reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    version: SipVersion,
    code: u16,
    reason: SmolStr,
}

impl StatusLine {
    /// Creates a status line, validating the code against the SIP range.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidStatusCode`] when `code` is outside
    /// 100-699.
    pub fn new(code: u16, reason: impl AsRef<str>) -> Result<Self, MessageError> {
        if !(100..=699).contains(&code) {
            return Err(MessageError::InvalidStatusCode { code });
        }
        Ok(Self {
            version: SipVersion::V2,
            code,
            reason: SmolStr::new(reason.as_ref()),
        })
    }

    /// Returns the SIP version.
    pub fn version(&self) -> SipVersion {
        self.version
    }

    /// Returns the status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Returns the reason phrase.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Immutable in-memory SIP request.
///
/// Once built, a request is never mutated; the transaction layer clones or
/// serializes it but leaves the original untouched for the lifetime of the
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    start: RequestLine,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Builds a request from its components.
    pub fn new(start: RequestLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the request line.
    pub fn start_line(&self) -> &RequestLine {
        &self.start
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        self.start.method()
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &SmolStr {
        self.start.uri()
    }

    /// Returns the SIP version.
    pub fn version(&self) -> SipVersion {
        self.start.version()
    }

    /// Returns the headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the message body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Immutable in-memory SIP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    start: StatusLine,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Builds a response from its components.
    pub fn new(start: StatusLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the status line.
    pub fn start_line(&self) -> &StatusLine {
        &self.start
    }

    /// Returns the status code.
    pub fn code(&self) -> u16 {
        self.start.code()
    }

    /// Returns the reason phrase.
    pub fn reason(&self) -> &str {
        self.start.reason()
    }

    /// Returns the headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the message body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the status class (`code / 100`, in 1..=6).
    pub fn class(&self) -> u16 {
        self.start.code() / 100
    }

    /// Returns true for 1xx responses.
    pub fn is_provisional(&self) -> bool {
        self.class() == 1
    }

    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.class() == 2
    }

    /// Returns true for any response of class 2 or above.
    pub fn is_final(&self) -> bool {
        self.class() >= 2
    }
}
