// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;
use std::sync::Arc;

use yare::parameterized;

use crate::cashier;
use crate::gate;
use crate::lift::{self, LiftSettings, ROW_SLOTS};
use crate::msg::{Channels, Intake};
use crate::operator::{Operator, OPERATOR_LOWER};
use crate::pass::PassKind;
use crate::store::Store;
use crate::test_support::{test_channels, StoreBuilder};
use crate::transit::GateKind;

use super::*;

#[parameterized(
    lone_pedestrian = { PatronKind::Pedestrian, 0, 1, 1 },
    lone_cyclist = { PatronKind::Cyclist, 0, 1, 2 },
    pedestrian_with_child = { PatronKind::Pedestrian, 1, 2, 2 },
    cyclist_family = { PatronKind::Cyclist, 2, 3, 4 },
)]
fn group_and_slot_math(kind: PatronKind, children: usize, group: u32, slots: u32) {
    let spec = PatronSpec {
        id: 1,
        age: 30,
        kind,
        vip: false,
        child_ages: vec![5; children],
    };
    assert_eq!(spec.group_size(), group);
    assert_eq!(spec.platform_slots(), slots);
}

#[test]
fn pedestrians_always_descend_on_t4() {
    for roll in [0, 33, 99] {
        assert_eq!(Route::pick(PatronKind::Pedestrian, roll), Route::T4);
    }
}

#[test]
fn cyclist_route_distribution_boundaries() {
    assert_eq!(Route::pick(PatronKind::Cyclist, 0), Route::T1);
    assert_eq!(Route::pick(PatronKind::Cyclist, 49), Route::T1);
    assert_eq!(Route::pick(PatronKind::Cyclist, 50), Route::T2);
    assert_eq!(Route::pick(PatronKind::Cyclist, 79), Route::T2);
    assert_eq!(Route::pick(PatronKind::Cyclist, 80), Route::T3);
    assert_eq!(Route::pick(PatronKind::Cyclist, 99), Route::T3);
}

#[test]
fn vips_use_gate_one_exclusively() {
    for _ in 0..20 {
        assert_eq!(pick_gate(true, 4), 0);
        let other = pick_gate(false, 4);
        assert!((1..4).contains(&other));
    }
}

/// Spawn the full service side (cashier, gates, operator-1, lift) against
/// `store`. Returns the patron-facing channels plus operator-1's control
/// sender, which must stay alive for the operator to keep running.
fn spawn_services(store: &Arc<Store>) -> (Channels, mpsc::Sender<crate::msg::OperatorCtl>) {
    let (channels, intake) = test_channels(2);
    let Intake { cashier: cashier_rx, gates, platform, lift: lift_rx } = intake;

    tokio::spawn(cashier::run(Arc::clone(store), cashier_rx));
    for (i, rx) in gates.into_iter().enumerate() {
        tokio::spawn(gate::run(Arc::clone(store), i as u8 + 1, rx));
    }

    let (op1_tx, op1_rx) = mpsc::channel(16);
    let (op2_tx, _op2_rx) = mpsc::channel(16);
    let operator = Operator::new(
        Arc::clone(store),
        OPERATOR_LOWER,
        op1_rx,
        op2_tx,
        Duration::from_millis(500),
    );
    tokio::spawn(operator.run(platform));

    tokio::spawn(lift::run(
        Arc::clone(store),
        lift_rx,
        LiftSettings {
            rows: 6,
            slot_capacity: ROW_SLOTS,
            tick: Duration::from_millis(5),
            grace: Duration::from_millis(10),
        },
    ));

    (channels, op1_tx)
}

#[tokio::test(start_paused = true)]
async fn a_single_ride_pass_buys_exactly_one_loop() {
    let store = StoreBuilder::new().build();
    let (channels, _op_ctl) = spawn_services(&store);
    let pass = store.passes.create(PassKind::SingleRide, 500, false).unwrap();

    let spec = PatronSpec {
        id: 1,
        age: 30,
        kind: PatronKind::Pedestrian,
        vip: false,
        child_ages: vec![],
    };
    let rides = ride_loop(&store, &channels, &spec, pass.id, 3).await;

    assert_eq!(rides, 1);
    assert!(pass.is_consumed());

    // One GATE1, one GATE2, one SUMMIT_EXIT entry.
    let entries = store.transit.snapshot();
    let count = |gate: GateKind| entries.iter().filter(|e| e.gate == gate).count();
    assert_eq!(count(GateKind::Entry), 1);
    assert_eq!(count(GateKind::Platform), 1);
    assert_eq!(count(GateKind::SummitExit), 1);

    // A pedestrian descends on T4.
    assert_eq!(store.stats.lock().route_uses, [0, 0, 0, 1]);

    // Everything held was returned.
    assert_eq!(store.occupancy.on_terrain.load(Ordering::Acquire), 0);
    assert_eq!(store.occupancy.on_platform.load(Ordering::Acquire), 0);
    assert_eq!(store.occupancy.on_chair.load(Ordering::Acquire), 0);
    assert_eq!(store.occupancy.on_top.load(Ordering::Acquire), 0);
    assert_eq!(store.terrain.available_permits(), 10);
    assert_eq!(store.platform.available_permits(), 4);
}

#[tokio::test(start_paused = true)]
async fn a_cyclist_family_fills_its_boarding_row() {
    let store = StoreBuilder::new().build();
    let (channels, _op_ctl) = spawn_services(&store);
    let pass = store.passes.create(PassKind::SingleRide, 500, false).unwrap();

    // Cyclist with two children: 2 + 1 + 1 = 4 platform slots.
    let spec = PatronSpec {
        id: 2,
        age: 30,
        kind: PatronKind::Cyclist,
        vip: false,
        child_ages: vec![5, 6],
    };
    assert_eq!(spec.platform_slots(), 4);

    let rides = ride_loop(&store, &channels, &spec, pass.id, 3).await;
    assert_eq!(rides, 1);
    assert_eq!(store.stats.lock().rides, 1);
    assert_eq!(store.occupancy.on_top.load(Ordering::Acquire), 0);
    assert_eq!(store.platform.available_permits(), 4);
}

#[tokio::test(start_paused = true)]
async fn an_expired_pass_never_reaches_the_gate() {
    let store = StoreBuilder::new().day_seconds(0).build();
    let (channels, _op_ctl) = spawn_services(&store);
    let pass = store.passes.create(PassKind::Daily, 10_000, false).unwrap();

    let spec = PatronSpec {
        id: 3,
        age: 40,
        kind: PatronKind::Pedestrian,
        vip: false,
        child_ages: vec![],
    };
    let rides = ride_loop(&store, &channels, &spec, pass.id, 3).await;
    assert_eq!(rides, 0);
    assert!(store.transit.is_empty());
    assert_eq!(pass.activated_at(), 0);
}

#[tokio::test(start_paused = true)]
async fn full_run_through_the_cashier() {
    let store = StoreBuilder::new().build();
    let (channels, _op_ctl) = spawn_services(&store);

    // The till rolls a random pass kind, so a deterministic full run uses
    // the one outcome that never depends on it: an unaccompanied minor.
    let spec = PatronSpec {
        id: 4,
        age: 6,
        kind: PatronKind::Pedestrian,
        vip: false,
        child_ages: vec![],
    };
    run(Arc::clone(&store), channels, spec, 3).await;

    assert_eq!(store.stats.lock().minors_refused, 1);
    assert_eq!(store.active_patrons.load(Ordering::Acquire), 0);
    assert!(store.passes.is_empty());
}
