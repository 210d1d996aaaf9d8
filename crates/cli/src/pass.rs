// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pass kinds, pricing and the shared pass registry.
//!
//! Passes are never deleted: the id is a dense index into the registry
//! (`id = index + 1`), so lookup is lock-free. Creation takes the registry
//! write lock; `activated_at` and `consumed` are atomics with a write-once
//! activation protocol.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Age below which a patron must be accompanied by an adult.
pub const SUPERVISION_AGE: u8 = 8;
/// Ages eligible for the discount: children below this...
pub const CHILD_DISCOUNT_AGE: u8 = 10;
/// ...and seniors at or above this.
pub const SENIOR_DISCOUNT_AGE: u8 = 65;
/// Discount percentage applied to both groups.
pub const DISCOUNT_PERCENT: u32 = 25;

/// What a purchased pass entitles the holder to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassKind {
    SingleRide,
    Timed30,
    Timed60,
    Timed120,
    Daily,
}

impl PassKind {
    /// List price in cents, before discounts.
    pub fn price_cents(&self) -> u32 {
        match self {
            Self::SingleRide => 500,
            Self::Timed30 => 2_000,
            Self::Timed60 => 3_500,
            Self::Timed120 => 5_000,
            Self::Daily => 10_000,
        }
    }

    /// Validity window in seconds from first activation. Zero for SingleRide:
    /// its lifetime is one admission, not a time window.
    pub fn validity_seconds(&self) -> i64 {
        match self {
            Self::SingleRide => 0,
            Self::Timed30 => 1_800,
            Self::Timed60 => 3_600,
            Self::Timed120 => 7_200,
            Self::Daily => 86_400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleRide => "single-ride",
            Self::Timed30 => "timed-30",
            Self::Timed60 => "timed-60",
            Self::Timed120 => "timed-120",
            Self::Daily => "daily",
        }
    }

    /// Dense index used by the sales counters.
    pub fn index(&self) -> usize {
        match self {
            Self::SingleRide => 0,
            Self::Timed30 => 1,
            Self::Timed60 => 2,
            Self::Timed120 => 3,
            Self::Daily => 4,
        }
    }

    /// Roll a kind from the till distribution:
    /// 40% single-ride, 20/15/10% timed, 15% daily.
    pub fn roll(percentile: u32) -> Self {
        match percentile % 100 {
            0..=39 => Self::SingleRide,
            40..=59 => Self::Timed30,
            60..=74 => Self::Timed60,
            75..=84 => Self::Timed120,
            _ => Self::Daily,
        }
    }
}

/// Apply the child/senior discount to a list price.
pub fn discounted_price(price_cents: u32, age: u8) -> u32 {
    if age < CHILD_DISCOUNT_AGE || age >= SENIOR_DISCOUNT_AGE {
        price_cents - price_cents * DISCOUNT_PERCENT / 100
    } else {
        price_cents
    }
}

/// A single pass record. Immutable identity fields plus two atomically
/// mutated lifecycle fields.
#[derive(Debug)]
pub struct Pass {
    pub id: u32,
    pub kind: PassKind,
    pub price_cents: u32,
    pub vip: bool,
    /// Remaining validity in seconds; only ever reduced (end-of-day truncation).
    validity_seconds: AtomicI64,
    /// Unix timestamp of first gate-1 admission; 0 = not yet activated.
    activated_at: AtomicI64,
    /// SingleRide only.
    consumed: AtomicBool,
}

impl Pass {
    fn new(id: u32, kind: PassKind, price_cents: u32, vip: bool) -> Self {
        Self {
            id,
            kind,
            price_cents,
            vip,
            validity_seconds: AtomicI64::new(kind.validity_seconds()),
            activated_at: AtomicI64::new(0),
            consumed: AtomicBool::new(false),
        }
    }

    pub fn activated_at(&self) -> i64 {
        self.activated_at.load(Ordering::Acquire)
    }

    pub fn validity_seconds(&self) -> i64 {
        self.validity_seconds.load(Ordering::Acquire)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Mark a SingleRide pass as used. No-op for timed kinds.
    pub fn consume(&self) {
        if self.kind == PassKind::SingleRide {
            self.consumed.store(true, Ordering::Release);
        }
    }

    /// Activate on first use. Exactly one caller wins the activation; the
    /// winner truncates the validity window so the pass dies at end of day.
    pub fn activate_at(&self, now: i64, end_of_day: i64) {
        if self.activated_at.compare_exchange(0, now, Ordering::AcqRel, Ordering::Acquire).is_ok()
            && self.kind != PassKind::SingleRide
            && end_of_day > 0
        {
            let remaining = (end_of_day - now).max(0);
            self.validity_seconds.fetch_min(remaining, Ordering::AcqRel);
        }
    }

    /// Whether this pass is accepted at gate-1 at `now`.
    ///
    /// After `end_of_day` every pass is dead regardless of its own window.
    /// An unactivated timed pass is valid (the clock starts at activation).
    pub fn is_valid_at(&self, now: i64, end_of_day: i64) -> bool {
        if end_of_day > 0 && now >= end_of_day {
            return false;
        }
        if self.kind == PassKind::SingleRide {
            return !self.is_consumed();
        }
        let activated = self.activated_at();
        if activated == 0 {
            return true;
        }
        now - activated < self.validity_seconds()
    }
}

/// Dense, append-only pass registry.
pub struct PassRegistry {
    passes: RwLock<Vec<Arc<Pass>>>,
    capacity: usize,
}

impl PassRegistry {
    pub fn new(capacity: usize) -> Self {
        Self { passes: RwLock::new(Vec::new()), capacity }
    }

    /// Issue a new pass. Returns `None` when the registry is full; the
    /// cashier refuses that request only.
    pub fn create(&self, kind: PassKind, price_cents: u32, vip: bool) -> Option<Arc<Pass>> {
        let mut passes = self.passes.write();
        if passes.len() >= self.capacity {
            return None;
        }
        let id = passes.len() as u32 + 1;
        let pass = Arc::new(Pass::new(id, kind, price_cents, vip));
        passes.push(Arc::clone(&pass));
        Some(pass)
    }

    /// Index-based lookup (`id = index + 1`).
    pub fn get(&self, id: u32) -> Option<Arc<Pass>> {
        if id == 0 {
            return None;
        }
        self.passes.read().get(id as usize - 1).cloned()
    }

    pub fn len(&self) -> usize {
        self.passes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "pass_tests.rs"]
mod tests;
