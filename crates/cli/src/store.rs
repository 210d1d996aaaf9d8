// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared simulation state: occupancy gauges, day phase, stats, capacity
//! semaphores. One explicitly-passed aggregate: agents receive `Arc<Store>`
//! and never touch globals.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::breakdown::Breakdown;
use crate::day_log::{DayEvent, DayLog};
use crate::pass::PassRegistry;
use crate::transit::TransitLog;

/// Phase of the operating day. Transitions are monotone and irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DayPhase {
    Open = 0,
    Closing = 1,
    Draining = 2,
    Shutdown = 3,
}

impl DayPhase {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            2 => Self::Draining,
            _ => Self::Shutdown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Draining => "DRAINING",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// Where a patron group currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Terrain,
    Platform,
    Chair,
    Top,
}

/// People counts per zone.
#[derive(Debug, Default)]
pub struct Occupancy {
    pub on_terrain: AtomicI64,
    pub on_platform: AtomicI64,
    pub on_chair: AtomicI64,
    pub on_top: AtomicI64,
}

impl Occupancy {
    pub fn gauge(&self, zone: Zone) -> &AtomicI64 {
        match zone {
            Zone::Terrain => &self.on_terrain,
            Zone::Platform => &self.on_platform,
            Zone::Chair => &self.on_chair,
            Zone::Top => &self.on_top,
        }
    }
}

/// Sales and traffic counters for the daily report.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub clients_total: u64,
    pub pedestrians: u64,
    pub cyclists: u64,
    pub vips: u64,
    pub family_groups: u64,
    pub minors_refused: u64,
    /// Indexed by [`PassKind::index`](crate::pass::PassKind::index).
    pub sold: [u64; 5],
    pub revenue_cents: u64,
    /// Indexed by route (T1..T4).
    pub route_uses: [u64; 4],
    pub stops: u64,
    pub rides: u64,
}

/// A held position in a zone: the gauge increment plus any semaphore permits
/// backing it. Dropping a `Presence` undoes both, so every patron exit path,
/// cancellation included, returns what it holds.
pub struct Presence {
    occupancy: Arc<Occupancy>,
    zone: Zone,
    heads: i64,
    _permits: Option<OwnedSemaphorePermit>,
}

impl Presence {
    /// Enter a zone: bump the gauge and take custody of `permits`.
    pub fn enter(
        occupancy: Arc<Occupancy>,
        zone: Zone,
        heads: i64,
        permits: Option<OwnedSemaphorePermit>,
    ) -> Self {
        occupancy.gauge(zone).fetch_add(heads, Ordering::AcqRel);
        Self { occupancy, zone, heads, _permits: permits }
    }

    /// Take custody of a position whose gauge was already bumped by another
    /// agent (gate-1 increments `on_terrain` before handing over the seats).
    pub fn adopt(
        occupancy: Arc<Occupancy>,
        zone: Zone,
        heads: i64,
        permits: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self { occupancy, zone, heads, _permits: permits }
    }
}

impl Drop for Presence {
    fn drop(&mut self) {
        self.occupancy.gauge(self.zone).fetch_sub(self.heads, Ordering::AcqRel);
    }
}

/// Inputs needed to build a [`Store`].
pub struct StoreSettings {
    pub terrain_seats: u32,
    pub platform_slots: u32,
    pub day_seconds: i64,
    pub pass_capacity: usize,
    pub transit_capacity: usize,
    pub day_log: DayLog,
}

/// The shared state aggregate.
pub struct Store {
    pub occupancy: Arc<Occupancy>,
    pub active_patrons: AtomicI64,
    phase: AtomicU8,
    pub started_at: i64,
    end_of_day: AtomicI64,
    panic: AtomicBool,
    pub passes: PassRegistry,
    pub transit: TransitLog,
    pub stats: Mutex<Stats>,
    pub breakdown: Breakdown,
    /// Terrain capacity (N seats); permits travel with the admitted patron.
    pub terrain: Arc<Semaphore>,
    /// Platform slots (one row's worth); held from admission until BOARD.
    pub platform: Arc<Semaphore>,
    pub shutdown: CancellationToken,
    pub day_log: DayLog,
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Store {
    pub fn new(settings: StoreSettings) -> Arc<Self> {
        let started_at = unix_now();
        Arc::new(Self {
            occupancy: Arc::new(Occupancy::default()),
            active_patrons: AtomicI64::new(0),
            phase: AtomicU8::new(DayPhase::Open as u8),
            started_at,
            end_of_day: AtomicI64::new(started_at + settings.day_seconds),
            panic: AtomicBool::new(false),
            passes: PassRegistry::new(settings.pass_capacity),
            transit: TransitLog::new(settings.transit_capacity),
            stats: Mutex::new(Stats::default()),
            breakdown: Breakdown::new(),
            terrain: Arc::new(Semaphore::new(settings.terrain_seats as usize)),
            platform: Arc::new(Semaphore::new(settings.platform_slots as usize)),
            shutdown: CancellationToken::new(),
            day_log: settings.day_log,
        })
    }

    pub fn now(&self) -> i64 {
        unix_now()
    }

    pub fn phase(&self) -> DayPhase {
        DayPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.phase() == DayPhase::Open
    }

    /// Advance the day phase. Monotone: moving backwards is a no-op.
    /// Returns whether the phase actually changed.
    pub fn advance_phase(&self, next: DayPhase) -> bool {
        let prev = self.phase.fetch_max(next as u8, Ordering::AcqRel);
        let changed = prev < next as u8;
        if changed {
            info!(phase = next.as_str(), "day phase advanced");
            self.day_log.push(&DayEvent::Phase { phase: next.as_str().to_owned(), at: self.now() });
        }
        changed
    }

    pub fn end_of_day(&self) -> i64 {
        self.end_of_day.load(Ordering::Acquire)
    }

    /// Pull end-of-day forward to `ts` (early close). Never extends the day.
    pub fn close_day_at(&self, ts: i64) {
        self.end_of_day.fetch_min(ts, Ordering::AcqRel);
    }

    pub fn panicked(&self) -> bool {
        self.panic.load(Ordering::Acquire)
    }

    /// Flag a panic shutdown (abnormal permanent-agent death during OPEN).
    pub fn raise_panic(&self) {
        if !self.panic.swap(true, Ordering::AcqRel) {
            self.day_log.push(&DayEvent::Panic { at: self.now() });
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
