// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: store builders and channel bundles.

use std::sync::Arc;

use crate::day_log::DayLog;
use crate::msg::{self, Channels, Intake};
use crate::store::{Store, StoreSettings};

/// Builder for a test [`Store`] with small capacities.
pub struct StoreBuilder {
    terrain_seats: u32,
    platform_slots: u32,
    day_seconds: i64,
    pass_capacity: usize,
    transit_capacity: usize,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            terrain_seats: 10,
            platform_slots: 4,
            day_seconds: 3_600,
            pass_capacity: 1_024,
            transit_capacity: 1_024,
        }
    }

    pub fn terrain_seats(mut self, seats: u32) -> Self {
        self.terrain_seats = seats;
        self
    }

    pub fn platform_slots(mut self, slots: u32) -> Self {
        self.platform_slots = slots;
        self
    }

    pub fn day_seconds(mut self, seconds: i64) -> Self {
        self.day_seconds = seconds;
        self
    }

    pub fn pass_capacity(mut self, capacity: usize) -> Self {
        self.pass_capacity = capacity;
        self
    }

    pub fn transit_capacity(mut self, capacity: usize) -> Self {
        self.transit_capacity = capacity;
        self
    }

    pub fn build(self) -> Arc<Store> {
        Store::new(StoreSettings {
            terrain_seats: self.terrain_seats,
            platform_slots: self.platform_slots,
            day_seconds: self.day_seconds,
            pass_capacity: self.pass_capacity,
            transit_capacity: self.transit_capacity,
            day_log: DayLog::new(None),
        })
    }
}

/// A default test store.
pub fn test_store() -> Arc<Store> {
    StoreBuilder::new().build()
}

/// Service queues with test-sized depth.
pub fn test_channels(gates: usize) -> (Channels, Intake) {
    msg::channels(gates, 32)
}
