// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate-1 agents: admit a patron's whole group onto the terrain after a pass
//! check and a terrain-capacity reservation.
//!
//! The pass is verified twice: once before waiting on the terrain semaphore
//! and again after, because the wait can outlive the pass. Admission hands
//! the acquired seats to the patron inside the reply.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};

use crate::breakdown::pause_point;
use crate::error::Refusal;
use crate::msg::{GateOutcome, GateRequest};
use crate::pass::PassKind;
use crate::store::Store;
use crate::transit::{GateKind, TransitEntry};

/// Run one entry gate until shutdown. Queued requests are refused on exit so
/// no patron is left waiting.
pub async fn run(
    store: Arc<Store>,
    gate_no: u8,
    mut rx: tokio::sync::mpsc::Receiver<GateRequest>,
) -> anyhow::Result<()> {
    info!(gate = gate_no, "gate: open");
    loop {
        tokio::select! {
            _ = store.shutdown.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => admit(&store, gate_no, req).await,
                None => break,
            },
        }
    }
    while let Ok(req) = rx.try_recv() {
        let _ = req.reply.send(GateOutcome::Refused(Refusal::Closed));
    }
    info!(gate = gate_no, "gate: closed");
    Ok(())
}

async fn admit(store: &Arc<Store>, gate_no: u8, req: GateRequest) {
    let Some(pass) = store.passes.get(req.pass_id) else {
        let _ = req.reply.send(GateOutcome::Refused(Refusal::InvalidPass));
        return;
    };
    if !pass.is_valid_at(store.now(), store.end_of_day()) {
        let _ = req.reply.send(GateOutcome::Refused(Refusal::InvalidPass));
        return;
    }

    pause_point(&store.breakdown, &store.shutdown).await;

    // Reserve a seat per group member.
    let Some(seats) = acquire_seats(store, req.group_size).await else {
        let _ = req.reply.send(GateOutcome::Refused(Refusal::Interrupted));
        return;
    };

    // Re-verify after the wait: the pass may have expired meanwhile. Dropping
    // the permit returns the seats.
    let now = store.now();
    if !pass.is_valid_at(now, store.end_of_day()) {
        drop(seats);
        let _ = req.reply.send(GateOutcome::Refused(Refusal::InvalidPass));
        return;
    }

    // The patron may have given up while we waited; nothing to admit then.
    if req.reply.is_closed() {
        debug!(gate = gate_no, patron = req.patron_id, "gate: patron gone, seats returned");
        return;
    }

    pass.activate_at(now, store.end_of_day());
    if pass.kind == PassKind::SingleRide {
        pass.consume();
    }

    store.occupancy.on_terrain.fetch_add(req.group_size as i64, Ordering::AcqRel);
    store.transit.append(TransitEntry {
        pass_id: req.pass_id,
        gate: GateKind::Entry,
        gate_no,
        timestamp: now,
    });

    debug!(gate = gate_no, patron = req.patron_id, group = req.group_size, "gate: admitted");
    if req.reply.send(GateOutcome::Admitted { seats }).is_err() {
        // Patron died between the liveness check and the reply: undo.
        store.occupancy.on_terrain.fetch_sub(req.group_size as i64, Ordering::AcqRel);
    }
}

async fn acquire_seats(store: &Arc<Store>, group_size: u32) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        _ = store.shutdown.cancelled() => None,
        permit = Arc::clone(&store.terrain).acquire_many_owned(group_size) => permit.ok(),
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
