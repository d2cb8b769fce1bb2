// tandem - a SIP client transaction engine
// Copyright (C) 2026 Tandem Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal SIP message surface for the Tandem transaction engine.
//!
//! The transaction layer reads a handful of fields from requests and
//! responses ([`Method`], status code, `Via`/`From`/`To`/`Call-ID`/`CSeq`/
//! `Route`) and otherwise treats header values and the request-URI as opaque
//! strings; their grammar belongs to a full message codec. This crate carries
//! exactly that surface:
//! - **Messages**: [`Request`], [`Response`]
//! - **Headers**: order-preserving [`Headers`] container
//! - **Methods**: [`Method`] with canonical token round-trip
//! - **Wire**: canonical serialization so retransmissions reuse identical
//!   bytes ([`wire::serialize_request`], [`wire::serialize_response`])
//!
//! [`SmolStr`](smol_str::SmolStr) and [`Bytes`](bytes::Bytes) keep header
//! values and bodies cheap to clone across the transaction runtime.

pub mod headers;
pub mod method;
pub mod msg;
pub mod version;
pub mod wire;

pub use headers::{Header, Headers};
pub use method::Method;
pub use msg::{MessageError, Request, RequestLine, Response, StatusLine};
pub use version::SipVersion;
