// tandem - a SIP client transaction engine
// Copyright (C) 2026 Tandem Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canonical wire serialization.
//!
//! The transaction layer retransmits from a stored [`Bytes`] image, so the
//! same message always serializes to the same bytes: headers are emitted in
//! insertion order, any incoming `Content-Length` is replaced with the actual
//! body length, and requests without `Max-Forwards` get the RFC 3261 default
//! of 70.

use bytes::{Bytes, BytesMut};

use crate::msg::{Request, Response};

/// Serializes a request into its canonical wire form.
pub fn serialize_request(req: &Request) -> Bytes {
    use std::fmt::Write;

    let mut head = String::new();
    let _ = write!(
        head,
        "{} {} {}\r\n",
        req.method().as_str(),
        req.uri(),
        req.version().as_str()
    );

    let mut has_max_forwards = false;
    for header in req.headers().iter() {
        if header.name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        if header.name.eq_ignore_ascii_case("Max-Forwards") {
            has_max_forwards = true;
        }
        let _ = write!(head, "{}: {}\r\n", header.name, header.value.trim());
    }
    if !has_max_forwards {
        head.push_str("Max-Forwards: 70\r\n");
    }
    let _ = write!(head, "Content-Length: {}\r\n\r\n", req.body().len());

    let mut out = BytesMut::with_capacity(head.len() + req.body().len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(req.body());
    out.freeze()
}

/// Serializes a response into its canonical wire form.
pub fn serialize_response(res: &Response) -> Bytes {
    use std::fmt::Write;

    let mut head = String::new();
    let _ = write!(
        head,
        "{} {} {}\r\n",
        res.start_line().version().as_str(),
        res.code(),
        res.reason()
    );

    for header in res.headers().iter() {
        if header.name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        let _ = write!(head, "{}: {}\r\n", header.name, header.value.trim());
    }
    let _ = write!(head, "Content-Length: {}\r\n\r\n", res.body().len());

    let mut out = BytesMut::with_capacity(head.len() + res.body().len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(res.body());
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Headers, Method, RequestLine, StatusLine};

    #[test]
    fn request_line_and_headers_in_order() {
        let request = Request::new(
            RequestLine::new(Method::Register, "sip:registrar.example.com"),
            Headers::new()
                .with("Via", "SIP/2.0/UDP client.example.com;branch=z9hG4bKnashds7")
                .with("Max-Forwards", "70")
                .with("From", "<sip:alice@example.com>;tag=9fxced76sl"),
            Bytes::new(),
        );

        let wire = serialize_request(&request);
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.starts_with("REGISTER sip:registrar.example.com SIP/2.0\r\n"));
        let via_at = text.find("Via:").unwrap();
        let from_at = text.find("From:").unwrap();
        assert!(via_at < from_at);
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn max_forwards_defaulted_when_absent() {
        let request = Request::new(
            RequestLine::new(Method::Options, "sip:bob@example.com"),
            Headers::new().with("Call-ID", "abc@host"),
            Bytes::new(),
        );
        let text = String::from_utf8(serialize_request(&request).to_vec()).unwrap();
        assert!(text.contains("Max-Forwards: 70\r\n"));
    }

    #[test]
    fn content_length_tracks_body() {
        let request = Request::new(
            RequestLine::new(Method::Invite, "sip:bob@example.com"),
            Headers::new().with("Content-Length", "999"),
            Bytes::from_static(b"v=0\r\n"),
        );
        let wire = serialize_request(&request);
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(!text.contains("999"));
        assert!(wire.ends_with(b"v=0\r\n"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let request = Request::new(
            RequestLine::new(Method::Invite, "sip:bob@example.com"),
            Headers::new().with("Via", "SIP/2.0/UDP host;branch=z9hG4bKabc"),
            Bytes::new(),
        );
        assert_eq!(serialize_request(&request), serialize_request(&request));
    }

    #[test]
    fn response_status_line() {
        let response = Response::new(
            StatusLine::new(486, "Busy Here").unwrap(),
            Headers::new().with("To", "<sip:bob@example.com>;tag=8321234356"),
            Bytes::new(),
        );
        let text = String::from_utf8(serialize_response(&response).to_vec()).unwrap();
        assert!(text.starts_with("SIP/2.0 486 Busy Here\r\n"));
        assert!(text.contains("To: <sip:bob@example.com>;tag=8321234356\r\n"));
    }
}
