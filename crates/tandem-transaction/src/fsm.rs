use std::time::Duration;

use bytes::Bytes;
use smol_str::SmolStr;
use tandem_msg::wire::serialize_request;
use tandem_msg::{Request, Response};

use crate::timers::{TimerTable, TransactionTimer};
use crate::{ack, InviteClientState, NonInviteClientState};

/// Events that drive the client transaction state machines.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Hand the original request to the machine (first event, exactly once).
    Send(Request),
    /// A 1xx response matched this transaction.
    ReceiveProvisional(Response),
    /// A final response (class 2..6) matched this transaction.
    ReceiveFinal(Response),
    /// A previously armed timer fired.
    TimerFired(TransactionTimer),
    /// The transport or the caller reported a terminal error.
    Error(TerminationReason),
}

/// Side effects requested by a transition; the runtime applies them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Hand the bytes to the transport. Retransmissions reuse the same image.
    Transmit(Bytes),
    /// Forward the response to the transaction user.
    Deliver(Response),
    /// Arm a one-shot timer.
    Schedule {
        timer: TransactionTimer,
        duration: Duration,
    },
    /// Cancel a timer if armed.
    Cancel(TransactionTimer),
    /// The machine reached its terminal state; always the last action. The
    /// runtime applies it only when every earlier [`Transmit`](Self::Transmit)
    /// in the batch succeeded; a failed send supersedes it with an abnormal
    /// transport termination.
    Terminate(Termination),
}

/// How a transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Final 2xx (INVITE), completed dwell expiry, or reliable-transport
    /// immediate completion.
    Normal,
    Abnormal(TerminationReason),
}

/// Why a transaction ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Timer B (INVITE) or Timer F (non-INVITE) expired.
    Timeout,
    /// The transport failed to send a request or ACK.
    Transport(SmolStr),
    /// The caller tore the transaction down.
    Shutdown(SmolStr),
}

/// INVITE client transaction (RFC 3261 §17.1.1).
///
/// A pure transition function: [`on_event`](Self::on_event) mutates only the
/// machine's own record and returns the side effects for the runtime to
/// apply. Timer fires that do not match the current state are discarded, so
/// a late delivery from a cancelled timer is harmless.
pub struct InviteClientFsm {
    state: InviteClientState,
    timers: TimerTable,
    a_interval: Duration,
    request: Option<Request>,
    wire: Option<Bytes>,
    ack: Option<Bytes>,
}

impl InviteClientFsm {
    /// Creates a machine in `Calling` with the given timer table.
    pub fn new(timers: TimerTable) -> Self {
        Self {
            state: InviteClientState::Calling,
            timers,
            a_interval: timers.duration(TransactionTimer::A),
            request: None,
            wire: None,
            ack: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> InviteClientState {
        self.state
    }

    /// Handles one event, returning the actions for the runtime.
    pub fn on_event(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        use InviteClientState::*;
        match (self.state, event) {
            (Terminated, _) => Vec::new(),
            (Calling, ClientEvent::Send(request)) => self.handle_send(request),
            (Calling | Proceeding, ClientEvent::ReceiveProvisional(response)) => {
                self.handle_provisional(response)
            }
            (Calling | Proceeding, ClientEvent::ReceiveFinal(response)) => {
                self.handle_final(response)
            }
            (Completed, ClientEvent::ReceiveFinal(response)) => {
                self.handle_completed_final(&response)
            }
            (Calling, ClientEvent::TimerFired(TransactionTimer::A)) => self.handle_timer_a(),
            (Calling | Proceeding, ClientEvent::TimerFired(TransactionTimer::B)) => {
                self.handle_timer_b()
            }
            (Completed, ClientEvent::TimerFired(TransactionTimer::D)) => self.handle_timer_d(),
            (_, ClientEvent::Error(reason)) => self.handle_error(reason),
            // Stale timers and out-of-state responses are no-ops.
            (_, ClientEvent::TimerFired(_)) => Vec::new(),
            _ => Vec::new(),
        }
    }

    fn handle_send(&mut self, request: Request) -> Vec<ClientAction> {
        let wire = serialize_request(&request);
        self.wire = Some(wire.clone());
        self.request = Some(request);

        let mut actions = vec![ClientAction::Transmit(wire)];
        if self.timers.should_retransmit() {
            actions.push(ClientAction::Schedule {
                timer: TransactionTimer::A,
                duration: self.a_interval,
            });
        }
        actions.push(ClientAction::Schedule {
            timer: TransactionTimer::B,
            duration: self.timers.duration(TransactionTimer::B),
        });
        actions
    }

    fn handle_provisional(&mut self, response: Response) -> Vec<ClientAction> {
        self.state = InviteClientState::Proceeding;
        // Retransmission ceases once a provisional arrives.
        vec![
            ClientAction::Deliver(response),
            ClientAction::Cancel(TransactionTimer::A),
        ]
    }

    fn handle_final(&mut self, response: Response) -> Vec<ClientAction> {
        let mut actions = vec![
            ClientAction::Deliver(response.clone()),
            ClientAction::Cancel(TransactionTimer::A),
            ClientAction::Cancel(TransactionTimer::B),
        ];

        if response.is_success() {
            // ACK for 2xx belongs to the core (RFC 3261 §13.2.2.4); the
            // transaction ends here.
            self.state = InviteClientState::Terminated;
            actions.push(ClientAction::Terminate(Termination::Normal));
            return actions;
        }

        if let Some(invite) = &self.request {
            let wire = serialize_request(&ack::ack_for_failure(invite, &response));
            self.ack = Some(wire.clone());
            actions.push(ClientAction::Transmit(wire));
        }

        if self.timers.reliable() {
            self.state = InviteClientState::Terminated;
            actions.push(ClientAction::Terminate(Termination::Normal));
        } else {
            self.state = InviteClientState::Completed;
            actions.push(ClientAction::Schedule {
                timer: TransactionTimer::D,
                duration: self.timers.duration(TransactionTimer::D),
            });
        }
        actions
    }

    fn handle_completed_final(&mut self, response: &Response) -> Vec<ClientAction> {
        // Retransmitted final: answer with the same ACK bytes. 2xx cannot
        // reach Completed (it already terminated the machine).
        if response.class() < 3 {
            return Vec::new();
        }
        match &self.ack {
            Some(wire) => vec![ClientAction::Transmit(wire.clone())],
            None => Vec::new(),
        }
    }

    fn handle_timer_a(&mut self) -> Vec<ClientAction> {
        let Some(wire) = &self.wire else {
            return Vec::new();
        };
        self.a_interval = self.a_interval.saturating_mul(2);
        vec![
            ClientAction::Transmit(wire.clone()),
            ClientAction::Schedule {
                timer: TransactionTimer::A,
                duration: self.a_interval,
            },
        ]
    }

    fn handle_timer_b(&mut self) -> Vec<ClientAction> {
        self.state = InviteClientState::Terminated;
        vec![
            ClientAction::Cancel(TransactionTimer::A),
            ClientAction::Terminate(Termination::Abnormal(TerminationReason::Timeout)),
        ]
    }

    fn handle_timer_d(&mut self) -> Vec<ClientAction> {
        self.state = InviteClientState::Terminated;
        vec![ClientAction::Terminate(Termination::Normal)]
    }

    fn handle_error(&mut self, reason: TerminationReason) -> Vec<ClientAction> {
        self.state = InviteClientState::Terminated;
        vec![ClientAction::Terminate(Termination::Abnormal(reason))]
    }
}

/// Non-INVITE client transaction (RFC 3261 §17.1.2).
pub struct NonInviteClientFsm {
    state: NonInviteClientState,
    timers: TimerTable,
    e_interval: Duration,
    wire: Option<Bytes>,
}

impl NonInviteClientFsm {
    /// Creates a machine in `Trying` with the given timer table.
    pub fn new(timers: TimerTable) -> Self {
        Self {
            state: NonInviteClientState::Trying,
            timers,
            e_interval: timers.duration(TransactionTimer::E),
            wire: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> NonInviteClientState {
        self.state
    }

    /// Handles one event, returning the actions for the runtime.
    pub fn on_event(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        use NonInviteClientState::*;
        match (self.state, event) {
            (Terminated, _) => Vec::new(),
            (Trying, ClientEvent::Send(request)) => self.handle_send(request),
            (Trying, ClientEvent::ReceiveProvisional(response)) => {
                self.state = Proceeding;
                vec![ClientAction::Deliver(response)]
            }
            // Subsequent provisionals do not re-enter Proceeding.
            (Proceeding, ClientEvent::ReceiveProvisional(response)) => {
                vec![ClientAction::Deliver(response)]
            }
            (Trying | Proceeding, ClientEvent::ReceiveFinal(response)) => {
                self.handle_final(response)
            }
            (Trying | Proceeding, ClientEvent::TimerFired(TransactionTimer::E)) => {
                self.handle_timer_e()
            }
            (Trying | Proceeding, ClientEvent::TimerFired(TransactionTimer::F)) => {
                self.handle_timer_f()
            }
            (Completed, ClientEvent::TimerFired(TransactionTimer::K)) => self.handle_timer_k(),
            (_, ClientEvent::Error(reason)) => self.handle_error(reason),
            // Stale timers and late response retransmissions are absorbed.
            (_, ClientEvent::TimerFired(_)) => Vec::new(),
            _ => Vec::new(),
        }
    }

    fn handle_send(&mut self, request: Request) -> Vec<ClientAction> {
        let wire = serialize_request(&request);
        self.wire = Some(wire.clone());

        let mut actions = vec![ClientAction::Transmit(wire)];
        if self.timers.should_retransmit() {
            actions.push(ClientAction::Schedule {
                timer: TransactionTimer::E,
                duration: self.e_interval,
            });
        }
        actions.push(ClientAction::Schedule {
            timer: TransactionTimer::F,
            duration: self.timers.duration(TransactionTimer::F),
        });
        actions
    }

    fn handle_final(&mut self, response: Response) -> Vec<ClientAction> {
        let mut actions = vec![
            ClientAction::Deliver(response),
            ClientAction::Cancel(TransactionTimer::E),
            ClientAction::Cancel(TransactionTimer::F),
        ];
        if self.timers.reliable() {
            self.state = NonInviteClientState::Terminated;
            actions.push(ClientAction::Terminate(Termination::Normal));
        } else {
            self.state = NonInviteClientState::Completed;
            actions.push(ClientAction::Schedule {
                timer: TransactionTimer::K,
                duration: self.timers.duration(TransactionTimer::K),
            });
        }
        actions
    }

    fn handle_timer_e(&mut self) -> Vec<ClientAction> {
        let Some(wire) = &self.wire else {
            return Vec::new();
        };
        // Doubling up to T2 in Trying, pinned at T2 in Proceeding.
        self.e_interval = match self.state {
            NonInviteClientState::Trying => {
                self.e_interval.saturating_mul(2).min(self.timers.t2())
            }
            _ => self.timers.t2(),
        };
        vec![
            ClientAction::Transmit(wire.clone()),
            ClientAction::Schedule {
                timer: TransactionTimer::E,
                duration: self.e_interval,
            },
        ]
    }

    fn handle_timer_f(&mut self) -> Vec<ClientAction> {
        self.state = NonInviteClientState::Terminated;
        vec![
            ClientAction::Cancel(TransactionTimer::E),
            ClientAction::Terminate(Termination::Abnormal(TerminationReason::Timeout)),
        ]
    }

    fn handle_timer_k(&mut self) -> Vec<ClientAction> {
        self.state = NonInviteClientState::Terminated;
        vec![ClientAction::Terminate(Termination::Normal)]
    }

    fn handle_error(&mut self, reason: TerminationReason) -> Vec<ClientAction> {
        self.state = NonInviteClientState::Terminated;
        vec![ClientAction::Terminate(Termination::Abnormal(reason))]
    }
}
