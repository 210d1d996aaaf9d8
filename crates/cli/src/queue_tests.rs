// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::store::DayPhase;
use crate::test_support::StoreBuilder;

use super::*;

#[tokio::test]
async fn vip_lane_is_served_first() {
    let (tx, mut rx) = classed::<u32>(8);
    tx.lane(false).send(1).await.unwrap();
    tx.lane(false).send(2).await.unwrap();
    tx.lane(true).send(100).await.unwrap();
    tx.lane(true).send(101).await.unwrap();

    assert_eq!(rx.recv().await, Some(100));
    assert_eq!(rx.recv().await, Some(101));
    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, Some(2));
}

#[tokio::test]
async fn fifo_within_a_class() {
    let (tx, mut rx) = classed::<u32>(8);
    for i in 0..5 {
        tx.lane(false).send(i).await.unwrap();
    }
    for i in 0..5 {
        assert_eq!(rx.recv().await, Some(i));
    }
}

#[tokio::test]
async fn recv_returns_none_when_both_lanes_close() {
    let (tx, mut rx) = classed::<u32>(4);
    tx.lane(true).send(7).await.unwrap();
    drop(tx);
    assert_eq!(rx.recv().await, Some(7));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn recv_waits_across_an_empty_vip_lane() {
    let (tx, mut rx) = classed::<u32>(4);
    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.lane(false).send(9).await.unwrap();
        // Keep the sender alive until the message is consumed.
        tokio::time::sleep(Duration::from_millis(20)).await;
    });
    assert_eq!(rx.recv().await, Some(9));
    sender.await.unwrap();
}

#[tokio::test]
async fn try_recv_prefers_vip() {
    let (tx, mut rx) = classed::<u32>(4);
    tx.lane(false).send(1).await.unwrap();
    tx.lane(true).send(2).await.unwrap();
    assert_eq!(rx.try_recv(), Some(2));
    assert_eq!(rx.try_recv(), Some(1));
    assert_eq!(rx.try_recv(), None);
}

#[tokio::test]
async fn backoff_send_delivers_once_capacity_frees() {
    let store = StoreBuilder::new().build();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<u32>(1);
    tx.send(1).await.unwrap();

    let store2 = std::sync::Arc::clone(&store);
    let sender = tokio::spawn(async move { send_with_backoff(&tx, 2, &store2).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(rx.recv().await, Some(1));
    sender.await.unwrap().unwrap();
    assert_eq!(rx.recv().await, Some(2));
}

#[tokio::test]
async fn backoff_send_gives_up_when_the_day_closes() {
    let store = StoreBuilder::new().build();
    let (tx, _rx) = tokio::sync::mpsc::channel::<u32>(1);
    tx.send(1).await.unwrap();

    store.advance_phase(DayPhase::Closing);
    let result = send_with_backoff(&tx, 2, &store).await;
    assert_eq!(result, Err(2));
}

#[tokio::test]
async fn backoff_send_fails_fast_on_a_closed_channel() {
    let store = StoreBuilder::new().build();
    let (tx, rx) = tokio::sync::mpsc::channel::<u32>(1);
    drop(rx);
    assert_eq!(send_with_backoff(&tx, 5, &store).await, Err(5));
}
