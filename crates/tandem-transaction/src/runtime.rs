// tandem - a SIP client transaction engine
// Copyright (C) 2026 Tandem Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-transaction runtime: dispatching, the event pump, and the collaborator
//! seams.
//!
//! Every transaction owns a single spawned task that drains an unbounded
//! event queue, so events for one transaction are processed strictly in
//! arrival order and never in parallel. Enqueueing through a
//! [`ClientTransactionHandle`] is non-blocking; events arriving after the
//! machine terminates are dropped silently.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use smol_str::SmolStr;
use tandem_msg::{Method, Request, Response};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::fsm::{
    ClientAction, ClientEvent, InviteClientFsm, NonInviteClientFsm, Termination,
    TerminationReason,
};
use crate::timers::{ActiveTimers, TimerConfig, TimerTable, TransactionTimer, TransportKind};
use crate::TransactionKey;

/// Outbound boundary of the transaction layer.
///
/// `send` is a fire-and-forget hand-off; the implementation owns buffering
/// and backpressure. Failures detected later are reported back through
/// [`ClientTransactionHandle::on_error`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hands serialized bytes to the transport.
    async fn send(&self, payload: Bytes) -> Result<()>;

    /// Returns the transport protocol, which decides the timer discipline.
    fn kind(&self) -> TransportKind;
}

/// Callbacks into the transaction user (the core that originated the
/// request).
///
/// `on_response` fires for provisional and final responses alike, and always
/// before any termination callback, so the core sees every response even for
/// transactions that terminate on the spot. ACK for 2xx INVITE responses is
/// the core's responsibility (RFC 3261 §13.2.2.4), not the transaction's.
#[async_trait]
pub trait TransactionUser: Send + Sync + 'static {
    async fn on_response(&self, key: &TransactionKey, response: &Response);
    async fn on_transport_error(&self, key: &TransactionKey, reason: &str);
    async fn on_timeout(&self, key: &TransactionKey);
    async fn on_terminated(&self, key: &TransactionKey, termination: Termination);
}

/// Events accepted by a transaction's queue.
#[derive(Debug)]
pub enum TransactionEvent {
    /// A response the registry matched to this transaction.
    Response(Response),
    /// A terminal error (transport failure or caller-initiated shutdown).
    Error(TerminationReason),
    /// A timer armed by this transaction fired.
    Timer(TransactionTimer),
}

/// Selects and starts the right client transaction machine for a request.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: TimerConfig,
}

impl Dispatcher {
    /// Creates a dispatcher with the default timer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher with a custom timer configuration.
    pub fn with_config(config: TimerConfig) -> Self {
        Self { config }
    }

    /// Starts a client transaction for `request`.
    ///
    /// INVITE gets the §17.1.1 machine, everything else the §17.1.2 machine.
    /// ACK is rejected: the ACK for a failed INVITE is generated *by* its
    /// transaction and never opens one of its own.
    ///
    /// # Errors
    ///
    /// Fails when the request is an ACK or its top `Via` carries no branch.
    pub fn start(
        &self,
        request: Request,
        transport: Arc<dyn Transport>,
        user: Arc<dyn TransactionUser>,
    ) -> Result<ClientTransactionHandle> {
        if request.method() == &Method::Ack {
            bail!("ACK is sent through an existing INVITE transaction, not dispatched as one");
        }
        let key = TransactionKey::from_request(&request)
            .ok_or_else(|| anyhow!("request carries no branch on its top Via"))?;

        let timers = TimerTable::new(self.config, transport.kind());
        let machine = if request.method() == &Method::Invite {
            Machine::Invite(InviteClientFsm::new(timers))
        } else {
            Machine::NonInvite(NonInviteClientFsm::new(timers))
        };

        debug!(
            branch = %key.branch,
            method = %key.method,
            machine = machine.tag(),
            transport = ?transport.kind(),
            "starting client transaction"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = ClientTransactionHandle {
            key: key.clone(),
            events: events_tx.clone(),
        };
        let pump = Pump {
            key,
            machine,
            transport,
            user,
            timers: ActiveTimers::new(),
            events_tx,
            events_rx,
        };
        tokio::spawn(pump.run(request));
        Ok(handle)
    }
}

/// Handle through which the registry and the caller feed a transaction.
///
/// All operations are non-blocking enqueues; once the transaction has
/// terminated they become no-ops.
#[derive(Debug, Clone)]
pub struct ClientTransactionHandle {
    key: TransactionKey,
    events: mpsc::UnboundedSender<TransactionEvent>,
}

impl ClientTransactionHandle {
    /// Returns the transaction's key.
    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    /// Delivers a response matched to this transaction.
    pub fn on_response(&self, response: Response) {
        if self
            .events
            .send(TransactionEvent::Response(response))
            .is_err()
        {
            debug!(branch = %self.key.branch, "response for terminated transaction dropped");
        }
    }

    /// Reports an asynchronous transport failure; the transaction terminates.
    pub fn on_error(&self, reason: impl Into<SmolStr>) {
        let _ = self.events.send(TransactionEvent::Error(
            TerminationReason::Transport(reason.into()),
        ));
    }

    /// Requests shutdown; the transaction terminates abnormally.
    pub fn stop(&self) {
        let _ = self.events.send(TransactionEvent::Error(
            TerminationReason::Shutdown(SmolStr::new("shutdown requested")),
        ));
    }
}

enum Machine {
    Invite(InviteClientFsm),
    NonInvite(NonInviteClientFsm),
}

impl Machine {
    fn on_event(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match self {
            Machine::Invite(fsm) => fsm.on_event(event),
            Machine::NonInvite(fsm) => fsm.on_event(event),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Machine::Invite(_) => "invite/client",
            Machine::NonInvite(_) => "non-invite/client",
        }
    }
}

/// Single-writer event pump: owns the machine and everything it touches.
struct Pump {
    key: TransactionKey,
    machine: Machine,
    transport: Arc<dyn Transport>,
    user: Arc<dyn TransactionUser>,
    timers: ActiveTimers,
    events_tx: mpsc::UnboundedSender<TransactionEvent>,
    events_rx: mpsc::UnboundedReceiver<TransactionEvent>,
}

impl Pump {
    async fn run(mut self, request: Request) {
        let actions = self.machine.on_event(ClientEvent::Send(request));
        if self.apply(actions).await {
            return;
        }

        while let Some(event) = self.events_rx.recv().await {
            let event = match event {
                TransactionEvent::Response(response) => {
                    if response.is_provisional() {
                        ClientEvent::ReceiveProvisional(response)
                    } else {
                        ClientEvent::ReceiveFinal(response)
                    }
                }
                TransactionEvent::Error(reason) => ClientEvent::Error(reason),
                TransactionEvent::Timer(timer) => ClientEvent::TimerFired(timer),
            };
            let actions = self.machine.on_event(event);
            if self.apply(actions).await {
                break;
            }
        }
    }

    /// Applies actions in order; returns true once the machine terminated.
    ///
    /// A failed send is terminal: the rest of the batch is abandoned,
    /// including any pending `Terminate(Normal)`, so the failure cannot be
    /// masked as a normal completion.
    async fn apply(&mut self, actions: Vec<ClientAction>) -> bool {
        for action in actions {
            match action {
                ClientAction::Transmit(payload) => {
                    trace!(
                        branch = %self.key.branch,
                        bytes = payload.len(),
                        "handing message to transport"
                    );
                    if let Err(error) = self.transport.send(payload).await {
                        warn!(
                            branch = %self.key.branch,
                            %error,
                            "transport rejected outbound message"
                        );
                        let reason = SmolStr::new(error.to_string());
                        self.terminate(Termination::Abnormal(TerminationReason::Transport(
                            reason,
                        )))
                        .await;
                        return true;
                    }
                }
                ClientAction::Deliver(response) => {
                    self.user.on_response(&self.key, &response).await;
                }
                ClientAction::Schedule { timer, duration } => {
                    self.timers.arm(self.events_tx.clone(), timer, duration);
                }
                ClientAction::Cancel(timer) => {
                    self.timers.cancel(timer);
                }
                ClientAction::Terminate(termination) => {
                    self.terminate(termination).await;
                    return true;
                }
            }
        }
        false
    }

    /// Cancels all timers and notifies the user, errors first
    /// (`on_timeout`/`on_transport_error`), then `on_terminated`.
    async fn terminate(&mut self, termination: Termination) {
        self.timers.cancel_all();
        match &termination {
            Termination::Abnormal(TerminationReason::Timeout) => {
                self.user.on_timeout(&self.key).await;
            }
            Termination::Abnormal(TerminationReason::Transport(reason))
            | Termination::Abnormal(TerminationReason::Shutdown(reason)) => {
                self.user.on_transport_error(&self.key, reason).await;
            }
            Termination::Normal => {}
        }
        debug!(
            branch = %self.key.branch,
            machine = self.machine.tag(),
            ?termination,
            "client transaction terminated"
        );
        self.user.on_terminated(&self.key, termination).await;
    }
}
