// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Patron agent: the per-visitor state machine from the till to the descent.
//!
//! AT_CASHIER → BEFORE_GATE1 → ON_TERRAIN → ON_PLATFORM → ON_CHAIR → AT_TOP
//! → ON_ROUTE, looping back to BEFORE_GATE1 while the pass stays valid.
//! Every held resource lives in a drop-guard, so every exit path returns
//! seats, slots and gauge counts.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::breakdown::pause_point;
use crate::lift::ROW_SLOTS;
use crate::msg::{
    Channels, GateOutcome, GateRequest, LiftRequest, LiftSignal, PlatformRequest, PurchaseOutcome,
    PurchaseRequest,
};
use crate::queue::send_with_backoff;
use crate::store::{Presence, Store, Zone};
use crate::transit::{GateKind, TransitEntry};

/// Walk from gate-1 to the platform gates.
const WALK: Duration = Duration::from_millis(100);
/// Pause at the bottom before queueing for another ride.
const STROLL: Duration = Duration::from_millis(100);
/// Exits at the upper station.
const SUMMIT_EXITS: u8 = 2;

/// How the patron travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatronKind {
    Pedestrian,
    Cyclist,
}

impl PatronKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pedestrian => "pedestrian",
            Self::Cyclist => "cyclist",
        }
    }
}

/// Descent routes. T1–T3 are cycling routes, T4 the walking route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    T1,
    T2,
    T3,
    T4,
}

impl Route {
    pub fn duration(&self) -> Duration {
        match self {
            Self::T1 => Duration::from_secs(1),
            Self::T2 => Duration::from_secs(2),
            Self::T3 => Duration::from_secs(3),
            Self::T4 => Duration::from_secs(4),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::T1 => 0,
            Self::T2 => 1,
            Self::T3 => 2,
            Self::T4 => 3,
        }
    }

    /// Pick a descent: cyclists split 50/30/20 across T1/T2/T3, pedestrians
    /// always walk T4.
    pub fn pick(kind: PatronKind, percentile: u32) -> Self {
        match kind {
            PatronKind::Pedestrian => Self::T4,
            PatronKind::Cyclist => match percentile % 100 {
                0..=49 => Self::T1,
                50..=79 => Self::T2,
                _ => Self::T3,
            },
        }
    }
}

/// Immutable attributes of one patron.
#[derive(Debug, Clone)]
pub struct PatronSpec {
    pub id: u32,
    pub age: u8,
    pub kind: PatronKind,
    pub vip: bool,
    pub child_ages: Vec<u8>,
}

impl PatronSpec {
    /// Heads in the group: the patron plus accompanied children.
    pub fn group_size(&self) -> u32 {
        1 + self.child_ages.len() as u32
    }

    /// Platform slot weight: a bicycle takes two slots, each child one.
    pub fn platform_slots(&self) -> u32 {
        let own = match self.kind {
            PatronKind::Pedestrian => 1,
            PatronKind::Cyclist => 2,
        };
        own + self.child_ages.len() as u32
    }
}

/// Registration in the live-patron count, undone on drop.
struct ActiveGuard {
    store: Arc<Store>,
}

impl ActiveGuard {
    fn new(store: &Arc<Store>) -> Self {
        store.active_patrons.fetch_add(1, Ordering::AcqRel);
        Self { store: Arc::clone(store) }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.store.active_patrons.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Drive one patron through the day.
pub async fn run(store: Arc<Store>, channels: Channels, spec: PatronSpec, platform_gates: u8) {
    let _active = ActiveGuard::new(&store);
    debug!(
        patron = spec.id,
        age = spec.age,
        kind = spec.kind.as_str(),
        vip = spec.vip,
        children = spec.child_ages.len(),
        "patron: arrived"
    );
    let rides = live(&store, &channels, &spec, platform_gates).await;
    debug!(patron = spec.id, rides, "patron: left");
}

async fn live(store: &Arc<Store>, channels: &Channels, spec: &PatronSpec, platform_gates: u8) -> u32 {
    // AT_CASHIER
    if !store.is_open() {
        return 0;
    }
    let Some(pass_id) = buy_pass(store, channels, spec).await else {
        return 0;
    };
    ride_loop(store, channels, spec, pass_id, platform_gates).await
}

/// The gate-to-descent loop, repeated while the pass lives.
async fn ride_loop(
    store: &Arc<Store>,
    channels: &Channels,
    spec: &PatronSpec,
    pass_id: u32,
    platform_gates: u8,
) -> u32 {
    let mut rides = 0u32;
    loop {
        // BEFORE_GATE1
        let Some(pass) = store.passes.get(pass_id) else { break };
        if !pass.is_valid_at(store.now(), store.end_of_day()) {
            debug!(patron = spec.id, rides, "patron: pass no longer valid");
            break;
        }

        // ON_TERRAIN
        let Some(terrain) = enter_terrain(store, channels, spec, pass_id).await else { break };
        sleep_while_running(WALK, store).await;
        store.transit.append(TransitEntry {
            pass_id,
            gate: GateKind::Platform,
            gate_no: rand::rng().random_range(1..=platform_gates),
            timestamp: store.now(),
        });

        // ON_PLATFORM. A group heavier than one row can never board.
        if spec.platform_slots() > ROW_SLOTS {
            debug!(patron = spec.id, slots = spec.platform_slots(), "patron: group too large");
            break;
        }
        pause_point(&store.breakdown, &store.shutdown).await;
        if !ask_platform(store, channels, spec).await {
            debug!(patron = spec.id, "patron: platform admission refused");
            break;
        }
        let Some(platform) = enter_platform(store, spec, terrain).await else { break };

        // ON_CHAIR
        pause_point(&store.breakdown, &store.shutdown).await;
        let (signal_tx, mut signal_rx) = mpsc::channel(2);
        let request = LiftRequest {
            patron_id: spec.id,
            vip: spec.vip,
            group_size: spec.group_size(),
            platform_slots: spec.platform_slots(),
            reply: signal_tx,
        };
        if send_with_backoff(&channels.lift, request, store).await.is_err() {
            break;
        }
        match signal_rx.recv().await {
            Some(LiftSignal::Board) => {
                store.occupancy.on_chair.fetch_add(spec.group_size() as i64, Ordering::AcqRel);
                drop(platform);
            }
            Some(LiftSignal::Stop) | Some(LiftSignal::Arrive) | None => {
                debug!(patron = spec.id, "patron: evacuated from the platform");
                break;
            }
        }

        // AT_TOP. The lift moved our heads from the chair to the top.
        let top = match signal_rx.recv().await {
            Some(LiftSignal::Arrive) => {
                Presence::adopt(Arc::clone(&store.occupancy), Zone::Top, spec.group_size() as i64, None)
            }
            _ => return rides,
        };
        rides += 1;
        store.transit.append(TransitEntry {
            pass_id,
            gate: GateKind::SummitExit,
            gate_no: rand::rng().random_range(1..=SUMMIT_EXITS),
            timestamp: store.now(),
        });

        // ON_ROUTE
        let route = Route::pick(spec.kind, rand::rng().random_range(0..100));
        sleep_while_running(route.duration(), store).await;
        store.stats.lock().route_uses[route.index()] += 1;
        drop(top);

        // Back at the bottom: ride again only on a living pass.
        let Some(pass) = store.passes.get(pass_id) else { break };
        if !pass.is_valid_at(store.now(), store.end_of_day()) {
            debug!(patron = spec.id, rides, "patron: pass spent");
            break;
        }
        if store.shutdown.is_cancelled() {
            break;
        }
        sleep_while_running(STROLL, store).await;
    }

    rides
}

async fn buy_pass(store: &Arc<Store>, channels: &Channels, spec: &PatronSpec) -> Option<u32> {
    let (reply, outcome) = oneshot::channel();
    let request = PurchaseRequest {
        patron_id: spec.id,
        age: spec.age,
        kind: spec.kind,
        vip: spec.vip,
        child_ages: spec.child_ages.clone(),
        reply,
    };
    send_with_backoff(channels.cashier.lane(spec.vip), request, store).await.ok()?;
    match outcome.await {
        Ok(PurchaseOutcome::Issued { pass_id, kind, .. }) => {
            debug!(patron = spec.id, pass = pass_id, kind = kind.as_str(), "patron: pass bought");
            Some(pass_id)
        }
        Ok(PurchaseOutcome::Refused(reason)) => {
            debug!(patron = spec.id, %reason, "patron: refused at the till");
            None
        }
        Err(_) => None,
    }
}

/// VIPs are routed to gate 1 exclusively; everyone else picks uniformly among
/// the remaining gates.
fn pick_gate(vip: bool, gates: usize) -> usize {
    if vip || gates == 1 {
        0
    } else {
        rand::rng().random_range(1..gates)
    }
}

async fn enter_terrain(
    store: &Arc<Store>,
    channels: &Channels,
    spec: &PatronSpec,
    pass_id: u32,
) -> Option<Presence> {
    let gate = pick_gate(spec.vip, channels.gates.len());
    let (reply, outcome) = oneshot::channel();
    let request = GateRequest {
        patron_id: spec.id,
        pass_id,
        group_size: spec.group_size(),
        reply,
    };
    send_with_backoff(&channels.gates[gate], request, store).await.ok()?;
    match outcome.await {
        Ok(GateOutcome::Admitted { seats }) => Some(Presence::adopt(
            Arc::clone(&store.occupancy),
            Zone::Terrain,
            spec.group_size() as i64,
            Some(seats),
        )),
        Ok(GateOutcome::Refused(reason)) => {
            debug!(patron = spec.id, %reason, "patron: refused at gate-1");
            None
        }
        Err(_) => None,
    }
}

async fn ask_platform(store: &Arc<Store>, channels: &Channels, spec: &PatronSpec) -> bool {
    let (reply, verdict) = oneshot::channel();
    let request = PlatformRequest { patron_id: spec.id, reply };
    if send_with_backoff(&channels.platform, request, store).await.is_err() {
        return false;
    }
    matches!(verdict.await, Ok(Ok(())))
}

/// Swap the terrain seat for platform slots: acquire the slots, step onto the
/// platform, then release the terrain.
async fn enter_platform(store: &Arc<Store>, spec: &PatronSpec, terrain: Presence) -> Option<Presence> {
    let slots = tokio::select! {
        _ = store.shutdown.cancelled() => None,
        permit = Arc::clone(&store.platform).acquire_many_owned(spec.platform_slots()) => permit.ok(),
    }?;
    let platform = Presence::enter(
        Arc::clone(&store.occupancy),
        Zone::Platform,
        spec.group_size() as i64,
        Some(slots),
    );
    drop(terrain);
    Some(platform)
}

async fn sleep_while_running(duration: Duration, store: &Store) {
    tokio::select! {
        _ = store.shutdown.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

#[cfg(test)]
#[path = "patron_tests.rs"]
mod tests;
