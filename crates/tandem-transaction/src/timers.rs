//! Timer discipline for the client transaction machines (RFC 3261 §17.1).
//!
//! Two concerns live here:
//! - [`TimerTable`]: which duration each named timer gets, derived from the
//!   configured base intervals and the transport. On reliable transports the
//!   retransmit timers are never armed and the completed dwell is elided, so
//!   a TCP transaction terminates as soon as its final response is handled.
//! - [`ActiveTimers`]: the one-shot timer service. Arming spawns a
//!   cancellable sleep that delivers the timer identity back into the owning
//!   transaction's event queue. Cancellation is best-effort; a fire that
//!   slips through is discarded by the state machine's pattern match.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::runtime::TransactionEvent;

/// Timers referenced by the client transaction state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionTimer {
    /// INVITE retransmit interval (doubles, uncapped).
    A,
    /// INVITE transaction timeout, 64·T1.
    B,
    /// INVITE completed dwell on unreliable transports.
    D,
    /// Non-INVITE retransmit interval (doubles up to T2).
    E,
    /// Non-INVITE transaction timeout, 64·T1.
    F,
    /// Non-INVITE completed dwell on unreliable transports.
    K,
}

/// Base timer intervals, configurable per RFC 3261 §17 Table 4.
///
/// `invite_t1` defaults to 600 ms rather than the RFC's 500 ms: with 64·T1 as
/// the transaction timeout this still lands inside the RFC's 32-64 s window
/// while spacing INVITE retransmissions slightly wider. Set it to 500 ms for
/// RFC-literal timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Base retransmit interval for non-INVITE transactions.
    pub t1: Duration,
    /// Retransmit interval cap for non-INVITE transactions.
    pub t2: Duration,
    /// Base retransmit interval for INVITE transactions.
    pub invite_t1: Duration,
    /// INVITE completed dwell on unreliable transports (Timer D).
    pub timer_d: Duration,
    /// Non-INVITE completed dwell on unreliable transports (Timer K).
    pub timer_k: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            invite_t1: Duration::from_millis(600),
            timer_d: Duration::from_secs(32),
            timer_k: Duration::from_secs(5),
        }
    }
}

impl TimerConfig {
    /// INVITE transaction timeout (Timer B), 64·invite_t1.
    pub fn timer_b(&self) -> Duration {
        self.invite_t1.saturating_mul(64)
    }

    /// Non-INVITE transaction timeout (Timer F), 64·t1.
    pub fn timer_f(&self) -> Duration {
        self.t1.saturating_mul(64)
    }
}

/// Transport protocol a transaction runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
    Tls,
    Sctp,
}

impl TransportKind {
    /// Returns true for stream-oriented transports whose delivery guarantees
    /// obviate transaction-layer retransmission.
    pub fn is_reliable(self) -> bool {
        !matches!(self, TransportKind::Udp)
    }
}

/// Transport-aware duration lookup for a single transaction.
#[derive(Debug, Clone, Copy)]
pub struct TimerTable {
    config: TimerConfig,
    transport: TransportKind,
}

impl TimerTable {
    /// Creates a timer table for the given configuration and transport.
    pub fn new(config: TimerConfig, transport: TransportKind) -> Self {
        Self { config, transport }
    }

    /// Returns the transport this table was built for.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns true when the transport is reliable.
    pub fn reliable(&self) -> bool {
        self.transport.is_reliable()
    }

    /// Returns whether retransmit timers (A/E) should be armed at all.
    pub fn should_retransmit(&self) -> bool {
        !self.reliable()
    }

    /// The non-INVITE retransmit cap.
    pub fn t2(&self) -> Duration {
        self.config.t2
    }

    /// Returns the initial duration for a named timer.
    ///
    /// Retransmit intervals (A/E) grow from here; the machines track the
    /// current interval themselves.
    pub fn duration(&self, timer: TransactionTimer) -> Duration {
        match timer {
            TransactionTimer::A => self.config.invite_t1,
            TransactionTimer::B => self.config.timer_b(),
            TransactionTimer::D => self.config.timer_d,
            TransactionTimer::E => self.config.t1,
            TransactionTimer::F => self.config.timer_f(),
            TransactionTimer::K => self.config.timer_k,
        }
    }
}

/// One-shot timers owned by a single transaction.
///
/// Each slot holds at most one armed timer; re-arming replaces the previous
/// one. All slots are optional — cancelling a timer that was never armed
/// (e.g. the retry timer on a reliable transport) is a no-op.
#[derive(Default)]
pub(crate) struct ActiveTimers {
    armed: HashMap<TransactionTimer, oneshot::Sender<()>>,
}

impl ActiveTimers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms `timer` to deliver into `events` after `duration`.
    pub(crate) fn arm(
        &mut self,
        events: mpsc::UnboundedSender<TransactionEvent>,
        timer: TransactionTimer,
        duration: Duration,
    ) {
        self.cancel(timer);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.armed.insert(timer, cancel_tx);
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(duration) => {
                    let _ = events.send(TransactionEvent::Timer(timer));
                }
                _ = &mut cancel_rx => {}
            }
        });
    }

    /// Cancels `timer` if it is armed.
    pub(crate) fn cancel(&mut self, timer: TransactionTimer) {
        if let Some(cancel) = self.armed.remove(&timer) {
            let _ = cancel.send(());
        }
    }

    /// Cancels every armed timer.
    pub(crate) fn cancel_all(&mut self) {
        for (_, cancel) in self.armed.drain() {
            let _ = cancel.send(());
        }
    }
}
