// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The chair ring and its tick loop.
//!
//! Model: `rows` chair rows circulate past two stations. Position 0 is the
//! lower station (boarding), position `rows/2` the upper (dismount); rows in
//! between carry passengers up, the rest travel back down empty. A head
//! cursor names the row currently at position 0; logical positions are
//! derived, never linked.
//!
//! Per tick: dismount the summit row, pack the bottom row from staging (VIPs
//! first), advance the head.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::breakdown::pause_point;
use crate::msg::{LiftRequest, LiftSignal};
use crate::store::{DayPhase, Store};

/// Slot capacity of one chair row.
pub const ROW_SLOTS: u32 = 4;
/// Max occupant groups per row.
pub const MAX_GROUPS_PER_ROW: usize = 4;

/// A group riding in a row.
#[derive(Debug)]
pub struct SeatedGroup {
    pub patron_id: u32,
    pub group_size: u32,
    pub reply: mpsc::Sender<LiftSignal>,
}

/// One chair row.
#[derive(Debug, Default)]
pub struct Row {
    occupants: Vec<SeatedGroup>,
    slots_used: u32,
}

impl Row {
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn slots_used(&self) -> u32 {
        self.slots_used
    }

    pub fn occupants(&self) -> &[SeatedGroup] {
        &self.occupants
    }
}

/// Fixed ring of rows with a moving head cursor.
pub struct LiftRing {
    rows: Vec<Row>,
    head: usize,
    slot_capacity: u32,
}

impl LiftRing {
    pub fn new(rows: usize, slot_capacity: u32) -> Self {
        let rows = (0..rows.max(2)).map(|_| Row::default()).collect();
        Self { rows, head: 0, slot_capacity }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Logical position of the upper station.
    pub fn summit_position(&self) -> usize {
        self.rows.len() / 2
    }

    fn index_at(&self, position: usize) -> usize {
        (self.head + position) % self.rows.len()
    }

    /// Row currently at the given logical position (0 = lower station).
    pub fn row_at(&self, position: usize) -> &Row {
        &self.rows[self.index_at(position)]
    }

    /// Move every row one position along the cable.
    pub fn advance(&mut self) {
        self.head = (self.head + 1) % self.rows.len();
    }

    /// Empty the summit row, returning the groups that arrived.
    pub fn unload_summit(&mut self) -> Vec<SeatedGroup> {
        let idx = self.index_at(self.summit_position());
        let row = &mut self.rows[idx];
        row.slots_used = 0;
        std::mem::take(&mut row.occupants)
    }

    /// Pack the bottom row from `staging`: VIPs first, then the rest, each
    /// seated only if its slot weight fits and the row has group room.
    /// Non-fitting candidates stay staged for a later tick. Returns the
    /// requests that were seated; the caller sends their `BOARD`.
    pub fn pack_bottom(&mut self, staging: &mut Vec<LiftRequest>) -> Vec<LiftRequest> {
        let idx = self.index_at(0);
        let mut boarded = Vec::new();
        if !self.rows[idx].is_empty() {
            return boarded;
        }
        for vip_pass in [true, false] {
            let mut i = 0;
            while i < staging.len() {
                let row = &mut self.rows[idx];
                if row.slots_used >= self.slot_capacity
                    || row.occupants.len() >= MAX_GROUPS_PER_ROW
                {
                    break;
                }
                if staging[i].vip != vip_pass {
                    i += 1;
                    continue;
                }
                let weight = staging[i].platform_slots.max(1);
                if weight <= self.slot_capacity - row.slots_used {
                    let req = staging.remove(i);
                    row.occupants.push(SeatedGroup {
                        patron_id: req.patron_id,
                        group_size: req.group_size,
                        reply: req.reply.clone(),
                    });
                    row.slots_used += weight;
                    boarded.push(req);
                } else {
                    i += 1;
                }
            }
        }
        boarded
    }

    /// Whether every row is empty.
    pub fn is_clear(&self) -> bool {
        self.rows.iter().all(Row::is_empty)
    }

    /// Empty every row (forced stop), returning all riders.
    pub fn unload_all(&mut self) -> Vec<SeatedGroup> {
        let mut riders = Vec::new();
        for row in &mut self.rows {
            row.slots_used = 0;
            riders.append(&mut row.occupants);
        }
        riders
    }
}

/// Lift task parameters.
pub struct LiftSettings {
    pub rows: usize,
    pub slot_capacity: u32,
    pub tick: Duration,
    pub grace: Duration,
}

/// Run the lift until the day drains or shutdown forces a stop.
///
/// Contract: for every accepted request exactly one `BOARD` then exactly one
/// `ARRIVE`, or exactly one `STOP` and nothing else. On a forced stop riders
/// already seated are carried out with `ARRIVE`; staged or still-queued
/// requests get `STOP`.
pub async fn run(
    store: Arc<Store>,
    mut rx: mpsc::Receiver<LiftRequest>,
    settings: LiftSettings,
) -> anyhow::Result<()> {
    let mut ring = LiftRing::new(settings.rows, settings.slot_capacity);
    let mut staging: Vec<LiftRequest> = Vec::new();
    let mut ticker = tokio::time::interval(settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        rows = ring.row_count(),
        tick_ms = settings.tick.as_millis() as u64,
        ascent_ms = (settings.tick * ring.summit_position() as u32).as_millis() as u64,
        "lift: running"
    );

    loop {
        tokio::select! {
            biased;
            _ = store.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Breakdown: park between ticks; the ring configuration is kept.
        if store.breakdown.is_stopped() {
            debug!("lift: breakdown, holding");
            pause_point(&store.breakdown, &store.shutdown).await;
            debug!("lift: resumed");
        }

        let intake_open = drain_requests(&mut rx, &mut staging);

        dismount(&store, &mut ring);
        board(&mut ring, &mut staging);
        ring.advance();

        // End of day: keep ticking until the pipeline is dry. Anything still
        // in the channel was sent before CLOSING and is owed service.
        if store.phase() >= DayPhase::Closing && staging.is_empty() && ring.is_clear() {
            drain_requests(&mut rx, &mut staging);
            if staging.is_empty() {
                info!("lift: drained, stopping after grace period");
                tokio::select! {
                    _ = store.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(settings.grace) => {}
                }
                break;
            }
        }

        if !intake_open && staging.is_empty() && ring.is_clear() {
            break;
        }
    }

    // Evacuation.
    drain_requests(&mut rx, &mut staging);
    for req in staging.drain(..) {
        let _ = req.reply.try_send(LiftSignal::Stop);
    }
    for group in ring.unload_all() {
        deliver(&store, &group);
    }

    info!("lift: stopped");
    Ok(())
}

/// Pull everything currently queued into staging. Returns whether the
/// channel still has senders.
fn drain_requests(rx: &mut mpsc::Receiver<LiftRequest>, staging: &mut Vec<LiftRequest>) -> bool {
    loop {
        match rx.try_recv() {
            Ok(req) => staging.push(req),
            Err(mpsc::error::TryRecvError::Empty) => return true,
            Err(mpsc::error::TryRecvError::Disconnected) => return false,
        }
    }
}

fn dismount(store: &Store, ring: &mut LiftRing) {
    for group in ring.unload_summit() {
        deliver(store, &group);
    }
}

/// Send `ARRIVE` and move the group's heads from the chair to the top.
fn deliver(store: &Store, group: &SeatedGroup) {
    let _ = group.reply.try_send(LiftSignal::Arrive);
    let heads = group.group_size as i64;
    store.occupancy.on_chair.fetch_sub(heads, Ordering::AcqRel);
    store.occupancy.on_top.fetch_add(heads, Ordering::AcqRel);
    store.stats.lock().rides += 1;
}

fn board(ring: &mut LiftRing, staging: &mut Vec<LiftRequest>) {
    if staging.is_empty() {
        return;
    }
    for req in ring.pack_bottom(staging) {
        let _ = req.reply.try_send(LiftSignal::Board);
    }
}

#[cfg(test)]
#[path = "lift_tests.rs"]
mod tests;
