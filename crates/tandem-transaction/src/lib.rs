//! RFC 3261 §17.1 client transaction engine.
//!
//! A client transaction mediates between the transaction user (the core that
//! originated a request) and the transport: it owns retransmission over
//! unreliable transports, response classification, ACK generation for failed
//! INVITEs, and timeout handling.
//!
//! The layer is split the way the state machines want to be tested:
//! - [`fsm`] holds the two pure state machines. A transition is a function
//!   from `(state, event)` to a list of [`fsm::ClientAction`]s; no I/O
//!   happens inside.
//! - [`runtime`] owns one spawned task per transaction that drains an event
//!   queue, feeds the machine, and applies its actions against the
//!   [`runtime::Transport`] and [`runtime::TransactionUser`] collaborators.
//! - [`timers`] carries the timer table (T1/T2, Timers A/B/D/E/F/K) and the
//!   cancellable one-shot timers that deliver back into the event queue.
//! - [`ack`] builds the ACK for a non-2xx final response to an INVITE.
//!
//! Response demultiplexing is the caller's job: whoever receives from the
//! network keeps a registry of [`TransactionKey`]s and forwards each response
//! to the matching [`runtime::ClientTransactionHandle`].

use rand::{distributions::Alphanumeric, Rng};
use smol_str::SmolStr;
use tandem_msg::{Method, Request};

pub mod ack;
pub mod fsm;
pub mod runtime;
pub mod timers;

pub use ack::ack_for_failure;
pub use fsm::{
    ClientAction, ClientEvent, InviteClientFsm, NonInviteClientFsm, Termination,
    TerminationReason,
};
pub use runtime::{
    ClientTransactionHandle, Dispatcher, TransactionEvent, TransactionUser, Transport,
};
pub use timers::{TimerConfig, TimerTable, TransactionTimer, TransportKind};

/// Client INVITE transaction states (RFC 3261 Figure 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InviteClientState {
    Calling,
    Proceeding,
    Completed,
    Terminated,
}

/// Client non-INVITE transaction states (RFC 3261 Figure 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonInviteClientState {
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// Identifies a client transaction end-to-end (RFC 3261 §17.1.3).
///
/// Responses match a transaction when the branch on their top `Via` and the
/// method in their `CSeq` equal this key; ACK reuses the INVITE's branch, so
/// the method is the one the transaction was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: SmolStr,
    pub method: Method,
}

impl TransactionKey {
    /// Derives the key from a request's top `Via` branch and method.
    pub fn from_request(req: &Request) -> Option<Self> {
        let branch = request_branch(req)?;
        Some(Self {
            branch,
            method: req.method().clone(),
        })
    }
}

/// Returns the top-most `Via` header value, if present.
pub fn top_via(req: &Request) -> Option<&SmolStr> {
    req.headers().get("Via")
}

/// Extracts a `;name=value` parameter from a header value.
pub fn header_param<'a>(value: &'a str, name: &str) -> Option<&'a str> {
    value.split(';').skip(1).find_map(|part| {
        let mut split = part.splitn(2, '=');
        let param = split.next()?.trim();
        let param_value = split.next()?.trim();
        if param.eq_ignore_ascii_case(name) {
            Some(param_value)
        } else {
            None
        }
    })
}

/// Extracts the `branch=` parameter from a Via header value.
pub fn branch_from_via(via: &str) -> Option<&str> {
    header_param(via, "branch")
}

/// Returns the branch ID for the given request, if one is present.
pub fn request_branch(req: &Request) -> Option<SmolStr> {
    let via = top_via(req)?;
    let branch = branch_from_via(via)?;
    Some(SmolStr::new(branch))
}

/// Generates a new RFC 3261 magic-cookie branch identifier.
pub fn generate_branch_id() -> SmolStr {
    let mut rng = rand::thread_rng();
    let suffix: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    SmolStr::new(format!("z9hG4bK{}", suffix))
}
