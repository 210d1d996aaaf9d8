// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cashier agent: sells passes, applies age discounts, refuses unsupervised
//! minors. VIP requests are served first via the classed queue.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::error::Refusal;
use crate::msg::{PurchaseOutcome, PurchaseRequest};
use crate::pass::{self, PassKind, SUPERVISION_AGE};
use crate::patron::PatronKind;
use crate::queue::ClassedReceiver;
use crate::store::Store;

/// Run the cashier until shutdown. Past OPEN it keeps answering so queued
/// patrons drain with a refusal instead of hanging.
pub async fn run(store: Arc<Store>, mut rx: ClassedReceiver<PurchaseRequest>) -> anyhow::Result<()> {
    info!("cashier: open");
    loop {
        tokio::select! {
            _ = store.shutdown.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => serve(&store, req),
                None => break,
            },
        }
    }
    // Flush whatever is still queued with refusals.
    while let Some(req) = rx.try_recv() {
        let _ = req.reply.send(PurchaseOutcome::Refused(Refusal::Closed));
    }
    info!("cashier: closed");
    Ok(())
}

fn serve(store: &Store, req: PurchaseRequest) {
    if !store.is_open() {
        let _ = req.reply.send(PurchaseOutcome::Refused(Refusal::Closed));
        return;
    }

    // Unaccompanied minors are turned away at the till.
    if req.age < SUPERVISION_AGE && req.child_ages.is_empty() {
        debug!(patron = req.patron_id, age = req.age, "cashier: unsupervised minor refused");
        store.stats.lock().minors_refused += 1;
        let _ = req.reply.send(PurchaseOutcome::Refused(Refusal::Unsupervised));
        return;
    }

    let kind = PassKind::roll(rand::rng().random_range(0..100));
    let price = pass::discounted_price(kind.price_cents(), req.age);

    let Some(issued) = store.passes.create(kind, price, req.vip) else {
        let _ = req.reply.send(PurchaseOutcome::Refused(Refusal::RegistryFull));
        return;
    };

    // Children ride on the same kind as the parent, discounted by their age.
    let mut child_pass_ids = Vec::with_capacity(req.child_ages.len());
    let mut child_revenue = 0u64;
    for &age in &req.child_ages {
        let child_price = pass::discounted_price(kind.price_cents(), age);
        if let Some(child_pass) = store.passes.create(kind, child_price, false) {
            child_pass_ids.push(child_pass.id);
            child_revenue += child_price as u64;
        }
    }

    {
        let mut stats = store.stats.lock();
        stats.clients_total += 1;
        match req.kind {
            PatronKind::Pedestrian => stats.pedestrians += 1,
            PatronKind::Cyclist => stats.cyclists += 1,
        }
        if req.vip {
            stats.vips += 1;
        }
        if !req.child_ages.is_empty() {
            stats.family_groups += 1;
        }
        stats.sold[kind.index()] += 1 + child_pass_ids.len() as u64;
        stats.revenue_cents += price as u64 + child_revenue;
    }

    debug!(
        patron = req.patron_id,
        pass = issued.id,
        kind = kind.as_str(),
        price_cents = price,
        "cashier: pass sold"
    );
    let _ = req.reply.send(PurchaseOutcome::Issued {
        pass_id: issued.id,
        kind,
        child_pass_ids,
    });
}

#[cfg(test)]
#[path = "cashier_tests.rs"]
mod tests;
