// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::breakdown::NO_INITIATOR;
use crate::error::Refusal;
use crate::msg::{OperatorCtl, PlatformRequest, SUPERVISOR};
use crate::store::{DayPhase, Store};
use crate::test_support::test_store;

use super::*;

struct Rig {
    store: Arc<Store>,
    op1: mpsc::Sender<OperatorCtl>,
    op2: mpsc::Sender<OperatorCtl>,
    platform: mpsc::Sender<PlatformRequest>,
}

/// Spawn both operators wired to each other, as the supervisor does.
fn rig() -> Rig {
    let store = test_store();
    let (op1_tx, op1_rx) = mpsc::channel(16);
    let (op2_tx, op2_rx) = mpsc::channel(16);
    let (platform_tx, platform_rx) = mpsc::channel(8);

    let lower = Operator::new(
        Arc::clone(&store),
        OPERATOR_LOWER,
        op1_rx,
        op2_tx.clone(),
        Duration::from_millis(500),
    );
    tokio::spawn(lower.run(platform_rx));

    let upper = Operator::new(
        Arc::clone(&store),
        OPERATOR_UPPER,
        op2_rx,
        op1_tx.clone(),
        Duration::from_millis(500),
    );
    let (dead_tx, dead_rx) = mpsc::channel(1);
    drop(dead_tx);
    tokio::spawn(upper.run(dead_rx));

    Rig { store, op1: op1_tx, op2: op2_tx, platform: platform_tx }
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn ask_platform(rig: &Rig) -> Result<(), Refusal> {
    let (reply, verdict) = oneshot::channel();
    rig.platform.send(PlatformRequest { patron_id: 1, reply }).await.unwrap();
    verdict.await.unwrap()
}

#[tokio::test]
async fn platform_admission_granted_while_open() {
    let rig = rig();
    assert_eq!(ask_platform(&rig).await, Ok(()));
}

#[tokio::test]
async fn platform_refused_during_breakdown() {
    let rig = rig();
    rig.store.breakdown.set();
    assert_eq!(ask_platform(&rig).await, Err(Refusal::Breakdown));
}

#[tokio::test]
async fn platform_refused_after_closing() {
    let rig = rig();
    rig.store.advance_phase(DayPhase::Closing);
    assert_eq!(ask_platform(&rig).await, Err(Refusal::Closed));
}

#[tokio::test]
async fn stop_signal_makes_the_receiver_the_initiator() {
    let rig = rig();
    rig.op1.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();

    let store = Arc::clone(&rig.store);
    eventually(move || store.breakdown.is_stopped()).await;
    assert_eq!(rig.store.breakdown.initiator(), OPERATOR_LOWER);
    assert_eq!(rig.store.stats.lock().stops, 1);
}

#[tokio::test]
async fn a_second_stop_on_the_peer_does_not_steal_ownership() {
    let rig = rig();
    rig.op1.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();
    let store = Arc::clone(&rig.store);
    eventually(move || store.breakdown.is_stopped()).await;

    rig.op2.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.store.breakdown.initiator(), OPERATOR_LOWER);
    assert_eq!(rig.store.stats.lock().stops, 1);
}

#[tokio::test]
async fn only_the_initiator_resumes() {
    let rig = rig();
    rig.op1.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();
    let store = Arc::clone(&rig.store);
    eventually(move || store.breakdown.is_stopped()).await;

    // START delivered to the wrong operator: the flag stays up.
    rig.op2.send(OperatorCtl::Start { from: SUPERVISOR }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(rig.store.breakdown.is_stopped());

    // START to the initiator clears it after the peer's READY.
    rig.op1.send(OperatorCtl::Start { from: SUPERVISOR }).await.unwrap();
    let store = Arc::clone(&rig.store);
    eventually(move || !store.breakdown.is_stopped()).await;
    assert_eq!(rig.store.breakdown.initiator(), NO_INITIATOR);
}

#[tokio::test]
async fn waiters_proceed_after_resume() {
    let rig = rig();
    rig.op1.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();
    let store = Arc::clone(&rig.store);
    eventually(move || store.breakdown.is_stopped()).await;

    let store = Arc::clone(&rig.store);
    let waiter = tokio::spawn(async move { store.breakdown.wait_resumed().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    rig.op1.send(OperatorCtl::Start { from: SUPERVISOR }).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
}

#[tokio::test]
async fn resume_without_a_peer_never_clears() {
    // Operator-1 alone; its peer channel has no receiver.
    let store = test_store();
    let (op1_tx, op1_rx) = mpsc::channel(16);
    let (peer_tx, peer_rx) = mpsc::channel::<OperatorCtl>(16);
    drop(peer_rx);
    let lower = Operator::new(
        Arc::clone(&store),
        OPERATOR_LOWER,
        op1_rx,
        peer_tx,
        Duration::from_millis(100),
    );
    let (dead_tx, dead_rx) = mpsc::channel(1);
    drop(dead_tx);
    tokio::spawn(lower.run(dead_rx));

    op1_tx.send(OperatorCtl::Stop { from: SUPERVISOR }).await.unwrap();
    let probe = Arc::clone(&store);
    eventually(move || probe.breakdown.is_stopped()).await;

    op1_tx.send(OperatorCtl::Start { from: SUPERVISOR }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.breakdown.is_stopped());
    assert_eq!(store.breakdown.initiator(), OPERATOR_LOWER);
}
