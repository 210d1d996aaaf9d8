// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two lift operators and the breakdown handshake.
//!
//! Operator-1 (lower station) also gates platform admission. A STOP signal
//! makes its receiver the initiator; only the initiator may resume, and only
//! after the peer confirms READY. The STOP side waits bounded; the START
//! side waits as long as the day stays OPEN.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::breakdown::Engage;
use crate::day_log::DayEvent;
use crate::error::Refusal;
use crate::msg::{OperatorCtl, PlatformRequest, SUPERVISOR};
use crate::store::Store;

/// Lower-station operator (platform admission + handshake).
pub const OPERATOR_LOWER: u8 = 1;
/// Upper-station operator (dismount side).
pub const OPERATOR_UPPER: u8 = 2;

/// Poll step while waiting for READY; the wait context is re-checked at this
/// cadence.
const READY_POLL: Duration = Duration::from_millis(20);

/// Outcome of a READY wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyWait {
    Ready,
    TimedOut,
    /// Day left OPEN, panic was raised, or the peer is gone.
    Abandoned,
    Interrupted,
}

pub struct Operator {
    store: Arc<Store>,
    role: u8,
    peer_role: u8,
    ctl_rx: mpsc::Receiver<OperatorCtl>,
    peer_tx: mpsc::Sender<OperatorCtl>,
    ready_timeout: Duration,
}

impl Operator {
    pub fn new(
        store: Arc<Store>,
        role: u8,
        ctl_rx: mpsc::Receiver<OperatorCtl>,
        peer_tx: mpsc::Sender<OperatorCtl>,
        ready_timeout: Duration,
    ) -> Self {
        Self { store, role, peer_role: 3 - role, ctl_rx, peer_tx, ready_timeout }
    }

    /// Run the operator until shutdown. `platform_rx` carries platform
    /// admission requests; operator-2 receives a dead channel and the branch
    /// disables itself.
    pub async fn run(mut self, mut platform_rx: mpsc::Receiver<PlatformRequest>) -> anyhow::Result<()> {
        info!(operator = self.role, "operator: on duty");
        loop {
            tokio::select! {
                _ = self.store.shutdown.cancelled() => break,
                Some(req) = platform_rx.recv() => self.serve_platform(req),
                msg = self.ctl_rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        info!(operator = self.role, "operator: off duty");
        Ok(())
    }

    /// Platform admission (gate-2): open day, no breakdown, no panic.
    fn serve_platform(&self, req: PlatformRequest) {
        let verdict = if self.store.panicked() {
            Err(Refusal::Closed)
        } else if self.store.breakdown.is_stopped() {
            Err(Refusal::Breakdown)
        } else if !self.store.is_open() {
            Err(Refusal::Closed)
        } else {
            Ok(())
        };
        let _ = req.reply.send(verdict);
    }

    async fn handle(&mut self, msg: OperatorCtl) {
        match msg {
            OperatorCtl::Stop { from } if from == SUPERVISOR => self.initiate_stop().await,
            OperatorCtl::Start { from } if from == SUPERVISOR => self.initiate_start().await,
            OperatorCtl::Stop { from } if from == self.peer_role => {
                info!(operator = self.role, "operator: STOP from peer, confirming READY");
                self.store.breakdown.set();
                let _ = self.peer_tx.try_send(OperatorCtl::Ready { from: self.role });
            }
            OperatorCtl::Start { from } if from == self.peer_role => {
                info!(operator = self.role, "operator: START from peer, confirming READY");
                let _ = self.peer_tx.try_send(OperatorCtl::Ready { from: self.role });
            }
            OperatorCtl::Ready { .. } => {
                // READY outside a handshake wait; stale, drop it.
                debug!(operator = self.role, "operator: stray READY");
            }
            other => debug!(operator = self.role, ?other, "operator: unexpected control message"),
        }
    }

    /// STOP signal landed on this operator: engage the breakdown and ask the
    /// peer to confirm.
    async fn initiate_stop(&mut self) {
        match self.store.breakdown.engage(self.role) {
            Engage::Engaged => {
                self.store.stats.lock().stops += 1;
                self.store
                    .day_log
                    .push(&DayEvent::Breakdown { operator: self.role, at: self.store.now() });
                warn!(operator = self.role, "operator: breakdown engaged (initiator)");
            }
            Engage::AlreadyOwner => {
                warn!(operator = self.role, "operator: repeating STOP handshake");
            }
            Engage::OwnedByOther => {
                // The other operator already stopped the lift.
                return;
            }
        }

        let _ = self.peer_tx.try_send(OperatorCtl::Stop { from: self.role });
        match self.await_ready(Some(self.ready_timeout), false).await {
            ReadyWait::Ready => info!(operator = self.role, "operator: peer READY (stop)"),
            outcome => {
                warn!(operator = self.role, ?outcome, "operator: no READY after STOP, continuing")
            }
        }
    }

    /// START signal: only the initiator may resume, and only with the peer's
    /// READY in hand.
    async fn initiate_start(&mut self) {
        if self.store.breakdown.initiator() != self.role {
            info!(operator = self.role, "operator: ignoring START, not the initiator");
            return;
        }
        if self.store.panicked() || !self.store.is_open() {
            info!(operator = self.role, "operator: START ignored, day is closing or panicked");
            return;
        }
        if self.peer_tx.is_closed() {
            warn!(operator = self.role, "operator: not resuming, peer operator is gone");
            return;
        }

        info!(operator = self.role, "operator: START (initiator), asking peer for READY");
        let _ = self.peer_tx.try_send(OperatorCtl::Start { from: self.role });

        // Without READY the breakdown is never cleared.
        match self.await_ready(None, true).await {
            ReadyWait::Ready => {}
            outcome => {
                warn!(operator = self.role, ?outcome, "operator: resume abandoned, breakdown stays");
                return;
            }
        }

        if self.store.breakdown.clear(self.role) {
            self.store.day_log.push(&DayEvent::Resume { operator: self.role, at: self.store.now() });
            info!(operator = self.role, "operator: lift resumed, waiters released");
        }
    }

    /// Wait for a READY from the peer. Bounded when `bound` is set; otherwise
    /// until the context dies (`require_open`: day leaves OPEN, panic, peer
    /// gone). Control traffic arriving mid-wait is answered in place so two
    /// simultaneous initiators cannot deadlock each other.
    async fn await_ready(&mut self, bound: Option<Duration>, require_open: bool) -> ReadyWait {
        let deadline = bound.map(|d| tokio::time::Instant::now() + d);
        loop {
            if require_open && (self.store.panicked() || !self.store.is_open()) {
                return ReadyWait::Abandoned;
            }
            if require_open && self.peer_tx.is_closed() {
                return ReadyWait::Abandoned;
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return ReadyWait::TimedOut;
                }
            }
            tokio::select! {
                _ = self.store.shutdown.cancelled() => return ReadyWait::Interrupted,
                _ = tokio::time::sleep(READY_POLL) => {}
                msg = self.ctl_rx.recv() => match msg {
                    None => return ReadyWait::Interrupted,
                    Some(OperatorCtl::Ready { .. }) => return ReadyWait::Ready,
                    Some(OperatorCtl::Stop { from }) if from == self.peer_role => {
                        self.store.breakdown.set();
                        let _ = self.peer_tx.try_send(OperatorCtl::Ready { from: self.role });
                    }
                    Some(OperatorCtl::Start { from }) if from == self.peer_role => {
                        let _ = self.peer_tx.try_send(OperatorCtl::Ready { from: self.role });
                    }
                    Some(_) => {}
                },
            }
        }
    }
}

#[cfg(test)]
#[path = "operator_tests.rs"]
mod tests;
