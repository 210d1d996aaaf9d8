// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed messages between agents.
//!
//! Requests carry a reply sender so the answer routes straight back to the
//! requesting patron; resource handover travels inside the reply (gate-1
//! passes the terrain seats it acquired as an owned permit).

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit};

use crate::error::Refusal;
use crate::pass::PassKind;
use crate::patron::PatronKind;
use crate::queue::ClassedSender;

/// Patron → cashier.
#[derive(Debug)]
pub struct PurchaseRequest {
    pub patron_id: u32,
    pub age: u8,
    pub kind: PatronKind,
    pub vip: bool,
    pub child_ages: Vec<u8>,
    pub reply: oneshot::Sender<PurchaseOutcome>,
}

/// Cashier → patron.
#[derive(Debug)]
pub enum PurchaseOutcome {
    Issued { pass_id: u32, kind: PassKind, child_pass_ids: Vec<u32> },
    Refused(Refusal),
}

/// Patron → gate-1.
#[derive(Debug)]
pub struct GateRequest {
    pub patron_id: u32,
    pub pass_id: u32,
    pub group_size: u32,
    pub reply: oneshot::Sender<GateOutcome>,
}

/// Gate-1 → patron. Admission hands over the terrain seats: dropping the
/// permit returns them, whatever path the patron exits through.
#[derive(Debug)]
pub enum GateOutcome {
    Admitted { seats: OwnedSemaphorePermit },
    Refused(Refusal),
}

/// Patron → operator-1 (platform admission).
#[derive(Debug)]
pub struct PlatformRequest {
    pub patron_id: u32,
    pub reply: oneshot::Sender<Result<(), Refusal>>,
}

/// Patron → lift.
#[derive(Debug)]
pub struct LiftRequest {
    pub patron_id: u32,
    pub vip: bool,
    pub group_size: u32,
    pub platform_slots: u32,
    pub reply: mpsc::Sender<LiftSignal>,
}

/// Lift → patron. For each accepted request: exactly one `Board` then exactly
/// one `Arrive`, or exactly one `Stop` and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftSignal {
    Board,
    Arrive,
    Stop,
}

/// Control messages between the operators (and from the supervisor's signal
/// forwarder, `from == SUPERVISOR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCtl {
    Stop { from: u8 },
    Start { from: u8 },
    Ready { from: u8 },
}

/// Sender id used when the supervisor forwards a signal.
pub const SUPERVISOR: u8 = 0;

/// The patron-facing sending ends of every service queue.
pub struct Channels {
    pub cashier: ClassedSender<PurchaseRequest>,
    pub gates: Vec<mpsc::Sender<GateRequest>>,
    pub platform: mpsc::Sender<PlatformRequest>,
    pub lift: mpsc::Sender<LiftRequest>,
}

impl Clone for Channels {
    fn clone(&self) -> Self {
        Self {
            cashier: self.cashier.clone(),
            gates: self.gates.clone(),
            platform: self.platform.clone(),
            lift: self.lift.clone(),
        }
    }
}

/// The service-side receiving ends, consumed when agents are spawned.
pub struct Intake {
    pub cashier: crate::queue::ClassedReceiver<PurchaseRequest>,
    pub gates: Vec<mpsc::Receiver<GateRequest>>,
    pub platform: mpsc::Receiver<PlatformRequest>,
    pub lift: mpsc::Receiver<LiftRequest>,
}

/// Build all service queues with `depth` capacity each.
pub fn channels(gates: usize, depth: usize) -> (Channels, Intake) {
    let (cashier_tx, cashier_rx) = crate::queue::classed(depth);
    let mut gate_txs = Vec::with_capacity(gates);
    let mut gate_rxs = Vec::with_capacity(gates);
    for _ in 0..gates {
        let (tx, rx) = mpsc::channel(depth);
        gate_txs.push(tx);
        gate_rxs.push(rx);
    }
    let (platform_tx, platform_rx) = mpsc::channel(depth);
    let (lift_tx, lift_rx) = mpsc::channel(depth);
    (
        Channels { cashier: cashier_tx, gates: gate_txs, platform: platform_tx, lift: lift_tx },
        Intake { cashier: cashier_rx, gates: gate_rxs, platform: platform_rx, lift: lift_rx },
    )
}
