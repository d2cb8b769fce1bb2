//! ACK construction for failed INVITEs (RFC 3261 §17.1.1.3).
//!
//! The ACK for a non-2xx final response belongs to the INVITE client
//! transaction itself: it reuses the INVITE's branch (the top `Via` is copied
//! verbatim) and travels through the same transaction. ACK for 2xx is a new
//! transaction owned by the core and is deliberately not built here.

use bytes::Bytes;
use smol_str::SmolStr;
use tandem_msg::{Headers, Method, Request, RequestLine, Response};

use crate::header_param;

/// Builds the ACK for a non-2xx final response to `invite`.
///
/// The `To` header is the INVITE's with its `tag` parameter overwritten by
/// the tag the peer assigned on the response; everything else (`Via`, `From`,
/// `Call-ID`, `Route`, the CSeq sequence number) is copied from the INVITE.
pub fn ack_for_failure(invite: &Request, response: &Response) -> Request {
    let mut headers = Headers::new();

    if let Some(via) = invite.headers().get("Via") {
        headers.push(SmolStr::new("Via"), via.clone());
    }
    headers.push(SmolStr::new("Max-Forwards"), SmolStr::new("70"));
    if let Some(from) = invite.headers().get("From") {
        headers.push(SmolStr::new("From"), from.clone());
    }
    if let Some(to) = invite.headers().get("To") {
        let remote_tag = response
            .headers()
            .get("To")
            .and_then(|value| header_param(value, "tag"));
        let value = match remote_tag {
            Some(tag) => with_tag(to, tag),
            None => to.clone(),
        };
        headers.push(SmolStr::new("To"), value);
    }
    if let Some(call_id) = invite.headers().get("Call-ID") {
        headers.push(SmolStr::new("Call-ID"), call_id.clone());
    }
    if let Some(cseq) = invite.headers().get("CSeq") {
        let sequence = cseq.split_whitespace().next().unwrap_or("1");
        headers.push(SmolStr::new("CSeq"), SmolStr::new(format!("{sequence} ACK")));
    }
    for route in invite.headers().get_all("Route") {
        headers.push(SmolStr::new("Route"), route.clone());
    }

    Request::new(
        RequestLine::new(Method::Ack, invite.uri().clone()),
        headers,
        Bytes::new(),
    )
}

/// Replaces (or appends) the `tag` parameter on an address header value.
fn with_tag(value: &str, tag: &str) -> SmolStr {
    let mut parts = value.split(';');
    let mut out = String::from(parts.next().unwrap_or("").trim_end());
    for part in parts {
        let name = part.splitn(2, '=').next().unwrap_or("").trim();
        if !name.eq_ignore_ascii_case("tag") {
            out.push(';');
            out.push_str(part);
        }
    }
    out.push_str(";tag=");
    out.push_str(tag);
    SmolStr::new(out)
}
