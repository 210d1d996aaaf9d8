// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only transit log.
//!
//! Fixed-capacity, write-once slots claimed by an atomic fetch-add on the
//! tail index. Entries past capacity are silently dropped (a counter records
//! how many); the log is never a reason to fail an admission.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Which checkpoint the entry was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    /// Gate-1: admission onto the terrain.
    Entry,
    /// Gate-2: passage onto the boarding platform.
    Platform,
    /// Exit from the upper station.
    SummitExit,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "GATE1",
            Self::Platform => "GATE2",
            Self::SummitExit => "SUMMIT_EXIT",
        }
    }
}

/// One recorded passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitEntry {
    pub pass_id: u32,
    pub gate: GateKind,
    pub gate_no: u8,
    pub timestamp: i64,
}

impl TransitEntry {
    /// CSV row: `pass_id;gate_type;gate_number;timestamp`.
    pub fn csv_row(&self) -> String {
        format!("{};{};{};{}", self.pass_id, self.gate.as_str(), self.gate_no, self.timestamp)
    }
}

/// Fixed-capacity append-only log.
pub struct TransitLog {
    slots: Box<[OnceLock<TransitEntry>]>,
    tail: AtomicUsize,
    dropped: AtomicU64,
}

impl TransitLog {
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<OnceLock<TransitEntry>> =
            (0..capacity).map(|_| OnceLock::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            tail: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an entry; drops it silently when the log is full.
    pub fn append(&self, entry: TransitEntry) {
        let idx = self.tail.fetch_add(1, Ordering::Relaxed);
        match self.slots.get(idx) {
            Some(slot) => {
                let _ = slot.set(entry);
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.tail.load(Ordering::Acquire).min(self.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many appends overflowed the capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Snapshot the retained entries in append order. Slots claimed but not
    /// yet written by a concurrent appender are skipped.
    pub fn snapshot(&self) -> Vec<TransitEntry> {
        self.slots[..self.len()].iter().filter_map(|s| s.get().copied()).collect()
    }
}

#[cfg(test)]
#[path = "transit_tests.rs"]
mod tests;
