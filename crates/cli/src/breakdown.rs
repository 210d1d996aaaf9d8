// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Breakdown flag, initiator ownership and the waiter barrier.
//!
//! A breakdown belongs to the operator that engaged it: only that operator
//! (or the supervisor on CLOSING/panic) may clear it. Agents park at the
//! barrier at their safe pause points and are woken together on resume.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// No operator owns the breakdown.
pub const NO_INITIATOR: u8 = 0;

/// What happened when an operator tried to engage a breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engage {
    /// The caller engaged a fresh breakdown and is now the initiator.
    Engaged,
    /// A breakdown was already active and the caller is its initiator.
    AlreadyOwner,
    /// A breakdown owned by the other operator is active.
    OwnedByOther,
}

pub struct Breakdown {
    stopped: AtomicBool,
    /// Operator number (1/2) of the initiator, `NO_INITIATOR` when clear.
    initiator: AtomicU8,
    waiting: AtomicUsize,
    resume: Notify,
}

impl Default for Breakdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Breakdown {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            initiator: AtomicU8::new(NO_INITIATOR),
            waiting: AtomicUsize::new(0),
            resume: Notify::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn initiator(&self) -> u8 {
        self.initiator.load(Ordering::Acquire)
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Engage a breakdown as `operator`. Only the first engagement (or the
    /// existing initiator repeating it) grants ownership.
    pub fn engage(&self, operator: u8) -> Engage {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.initiator.store(operator, Ordering::Release);
            return Engage::Engaged;
        }
        if self.initiator() == operator {
            Engage::AlreadyOwner
        } else {
            Engage::OwnedByOther
        }
    }

    /// Raise the flag without claiming ownership (peer acknowledging a STOP
    /// it did not initiate).
    pub fn set(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Clear the breakdown as `operator`. Only the recorded initiator may
    /// clear; returns whether the clear happened. Waiters are released.
    pub fn clear(&self, operator: u8) -> bool {
        if self.initiator() != operator {
            return false;
        }
        self.initiator.store(NO_INITIATOR, Ordering::Release);
        self.stopped.store(false, Ordering::Release);
        self.resume.notify_waiters();
        true
    }

    /// Force-clear regardless of ownership. Supervisor only: CLOSING and
    /// panic shutdown release stuck agents so the drain can proceed.
    pub fn force_clear(&self) {
        self.initiator.store(NO_INITIATOR, Ordering::Release);
        self.stopped.store(false, Ordering::Release);
        self.resume.notify_waiters();
    }

    /// Park until the breakdown clears. Registers the caller in the waiter
    /// count for the duration; the count survives cancellation of the wait.
    pub async fn wait_resumed(&self) {
        struct Registered<'a>(&'a AtomicUsize);
        impl Drop for Registered<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::AcqRel);
            }
        }
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let _registered = Registered(&self.waiting);
        loop {
            if !self.is_stopped() {
                break;
            }
            let notified = self.resume.notified();
            // Re-check between registering interest and parking, else a
            // concurrent clear could be missed.
            if !self.is_stopped() {
                break;
            }
            notified.await;
        }
    }
}

/// Safe pause point: park at the barrier if a breakdown is active, abandoning
/// the wait on shutdown.
pub async fn pause_point(breakdown: &Breakdown, shutdown: &CancellationToken) {
    if !breakdown.is_stopped() {
        return;
    }
    tokio::select! {
        _ = breakdown.wait_resumed() => {}
        _ = shutdown.cancelled() => {}
    }
}

#[cfg(test)]
#[path = "breakdown_tests.rs"]
mod tests;
