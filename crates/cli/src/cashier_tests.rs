// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::Refusal;
use crate::msg::{PurchaseOutcome, PurchaseRequest};
use crate::queue::classed;
use crate::store::DayPhase;
use crate::test_support::StoreBuilder;

use super::*;

fn request(
    age: u8,
    child_ages: Vec<u8>,
) -> (PurchaseRequest, oneshot::Receiver<PurchaseOutcome>) {
    let (reply, outcome) = oneshot::channel();
    (
        PurchaseRequest {
            patron_id: 1,
            age,
            kind: PatronKind::Pedestrian,
            vip: false,
            child_ages,
            reply,
        },
        outcome,
    )
}

#[tokio::test]
async fn sells_a_pass_and_updates_stats() {
    let store = StoreBuilder::new().build();
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(30, vec![]);
    tx.lane(false).send(req).await.unwrap();

    match outcome.await.unwrap() {
        PurchaseOutcome::Issued { pass_id, kind, child_pass_ids } => {
            assert_eq!(pass_id, 1);
            assert!(child_pass_ids.is_empty());
            let pass = store.passes.get(pass_id).unwrap();
            assert_eq!(pass.kind, kind);
            assert_eq!(pass.activated_at(), 0);
        }
        other => panic!("expected a pass, got {other:?}"),
    }

    let stats = store.stats.lock().clone();
    assert_eq!(stats.clients_total, 1);
    assert_eq!(stats.pedestrians, 1);
    assert_eq!(stats.sold.iter().sum::<u64>(), 1);
    assert!(stats.revenue_cents > 0);

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn refuses_an_unsupervised_minor() {
    let store = StoreBuilder::new().build();
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(6, vec![]);
    tx.lane(false).send(req).await.unwrap();

    assert!(matches!(
        outcome.await.unwrap(),
        PurchaseOutcome::Refused(Refusal::Unsupervised)
    ));
    assert_eq!(store.stats.lock().minors_refused, 1);
    assert!(store.passes.is_empty());
    assert_eq!(store.stats.lock().clients_total, 0);

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn a_minor_with_children_in_tow_is_served() {
    // Below the supervision age but accompanied: the till serves them.
    let store = StoreBuilder::new().build();
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(6, vec![5]);
    tx.lane(false).send(req).await.unwrap();
    assert!(matches!(outcome.await.unwrap(), PurchaseOutcome::Issued { .. }));

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn children_get_passes_of_the_same_kind() {
    let store = StoreBuilder::new().build();
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(35, vec![5, 7]);
    tx.lane(false).send(req).await.unwrap();

    match outcome.await.unwrap() {
        PurchaseOutcome::Issued { pass_id, kind, child_pass_ids } => {
            assert_eq!(child_pass_ids.len(), 2);
            for id in &child_pass_ids {
                let child_pass = store.passes.get(*id).unwrap();
                assert_eq!(child_pass.kind, kind);
                assert!(!child_pass.vip);
                // Children always price below the adult list price.
                assert!(child_pass.price_cents < kind.price_cents());
            }
            assert_ne!(pass_id, child_pass_ids[0]);
        }
        other => panic!("expected a pass, got {other:?}"),
    }

    let stats = store.stats.lock().clone();
    assert_eq!(stats.family_groups, 1);
    assert_eq!(stats.sold.iter().sum::<u64>(), 3);

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn refuses_after_the_day_closes() {
    let store = StoreBuilder::new().build();
    store.advance_phase(DayPhase::Closing);
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(30, vec![]);
    tx.lane(false).send(req).await.unwrap();
    assert!(matches!(
        outcome.await.unwrap(),
        PurchaseOutcome::Refused(Refusal::Closed)
    ));

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn refuses_when_the_registry_is_full() {
    let store = StoreBuilder::new().pass_capacity(0).build();
    let (tx, rx) = classed(8);
    let cashier = tokio::spawn(run(Arc::clone(&store), rx));

    let (req, outcome) = request(30, vec![]);
    tx.lane(false).send(req).await.unwrap();
    assert!(matches!(
        outcome.await.unwrap(),
        PurchaseOutcome::Refused(Refusal::RegistryFull)
    ));

    store.shutdown.cancel();
    cashier.await.unwrap().unwrap();
}

#[tokio::test]
async fn queued_requests_are_flushed_with_refusals_at_shutdown() {
    let store = StoreBuilder::new().build();
    let (tx, rx) = classed(8);

    // Queue a request, then shut down before spawning the cashier: the flush
    // path must answer it. The phase is closed too, so a racing serve path
    // refuses just the same.
    let (req, outcome) = request(30, vec![]);
    tx.lane(false).send(req).await.unwrap();
    store.advance_phase(DayPhase::Closing);
    store.shutdown.cancel();

    run(Arc::clone(&store), rx).await.unwrap();
    assert!(matches!(
        outcome.await.unwrap(),
        PurchaseOutcome::Refused(Refusal::Closed)
    ));
}
