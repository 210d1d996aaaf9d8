// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Patron generator: spawns patron tasks at a controlled rate while the day
//! is OPEN, then drains them.
//!
//! The generator is never killed at end of day: it observes the phase, stops
//! spawning, and waits for every patron it spawned. An abnormal patron end
//! during OPEN raises the panic flag.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::msg::Channels;
use crate::patron::{self, PatronKind, PatronSpec};
use crate::store::Store;

/// Idle step while paused (breakdown or at the active-patron cap).
const HOLD: Duration = Duration::from_millis(100);

pub struct GeneratorSettings {
    pub spawn_delay: Duration,
    pub max_active: u32,
    pub platform_gates: u8,
}

/// Run the generator: spawn until the day leaves OPEN, then drain.
pub async fn run(
    store: Arc<Store>,
    channels: Channels,
    settings: GeneratorSettings,
) -> anyhow::Result<()> {
    let mut patrons = JoinSet::new();
    let mut spawned = 0u32;
    info!("generator: spawning patrons");

    while store.is_open() && !store.shutdown.is_cancelled() {
        while let Some(result) = patrons.try_join_next() {
            note_patron_end(&store, result);
        }

        // Spawning pauses during a breakdown and at the population cap.
        if store.breakdown.is_stopped()
            || store.active_patrons.load(Ordering::Acquire) >= settings.max_active as i64
        {
            tokio::select! {
                _ = store.shutdown.cancelled() => break,
                _ = tokio::time::sleep(HOLD) => {}
            }
            continue;
        }

        tokio::select! {
            _ = store.shutdown.cancelled() => break,
            _ = tokio::time::sleep(settings.spawn_delay) => {}
        }
        if !store.is_open() {
            break;
        }

        spawned += 1;
        let spec = random_spec(spawned);
        patrons.spawn(patron::run(
            Arc::clone(&store),
            channels.clone(),
            spec,
            settings.platform_gates,
        ));
    }

    info!(spawned, "generator: spawning stopped, draining patrons");
    while let Some(result) = patrons.join_next().await {
        note_patron_end(&store, result);
    }
    info!(spawned, "generator: all patrons done");
    Ok(())
}

/// A patron task never returns early; a join error during OPEN means it
/// panicked, and the whole day comes down.
fn note_patron_end(store: &Store, result: Result<(), JoinError>) {
    if let Err(err) = result {
        if !err.is_cancelled() && store.is_open() {
            error!("generator: patron died abnormally: {err}");
            store.raise_panic();
        }
    }
}

/// Roll one patron from the population distribution: 50% cyclists, 1% VIP,
/// ages 4–80; one adult in five brings a child, three in ten of those two.
pub fn random_spec(id: u32) -> PatronSpec {
    let mut rng = rand::rng();
    let age = rng.random_range(4..=80);
    let kind = if rng.random_bool(0.5) { PatronKind::Cyclist } else { PatronKind::Pedestrian };
    let vip = rng.random_ratio(1, 100);
    let mut child_ages = Vec::new();
    if age >= 18 && rng.random_ratio(20, 100) {
        child_ages.push(rng.random_range(4..8));
        if rng.random_ratio(30, 100) {
            child_ages.push(rng.random_range(4..8));
        }
    }
    PatronSpec { id, age, kind, vip, child_ages }
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod tests;
