// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority-classed channels and back-pressured sends.
//!
//! VIP priority is realised as a pair of bounded channels drained VIP-first;
//! within a class the channel preserves FIFO order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::store::{DayPhase, Store};

const BACKOFF_START: Duration = Duration::from_millis(1);
const BACKOFF_CAP: Duration = Duration::from_millis(200);

/// Sender half of a classed channel pair.
pub struct ClassedSender<T> {
    vip: mpsc::Sender<T>,
    normal: mpsc::Sender<T>,
}

impl<T> Clone for ClassedSender<T> {
    fn clone(&self) -> Self {
        Self { vip: self.vip.clone(), normal: self.normal.clone() }
    }
}

impl<T> ClassedSender<T> {
    /// The lane matching the caller's class.
    pub fn lane(&self, vip: bool) -> &mpsc::Sender<T> {
        if vip {
            &self.vip
        } else {
            &self.normal
        }
    }

    pub fn is_closed(&self) -> bool {
        self.vip.is_closed() && self.normal.is_closed()
    }
}

/// Receiver half of a classed channel pair. `recv` serves any queued VIP
/// message before looking at the normal lane.
pub struct ClassedReceiver<T> {
    vip: mpsc::Receiver<T>,
    normal: mpsc::Receiver<T>,
    vip_open: bool,
    normal_open: bool,
}

impl<T> ClassedReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if self.vip_open {
                match self.vip.try_recv() {
                    Ok(msg) => return Some(msg),
                    Err(TryRecvError::Disconnected) => self.vip_open = false,
                    Err(TryRecvError::Empty) => {}
                }
            }
            tokio::select! {
                biased;
                msg = self.vip.recv(), if self.vip_open => match msg {
                    Some(msg) => return Some(msg),
                    None => self.vip_open = false,
                },
                msg = self.normal.recv(), if self.normal_open => match msg {
                    Some(msg) => return Some(msg),
                    None => self.normal_open = false,
                },
                else => return None,
            }
        }
    }

    /// Non-blocking drain step, VIP first.
    pub fn try_recv(&mut self) -> Option<T> {
        if let Ok(msg) = self.vip.try_recv() {
            return Some(msg);
        }
        self.normal.try_recv().ok()
    }
}

/// Build a classed channel pair with `depth` capacity per lane.
pub fn classed<T>(depth: usize) -> (ClassedSender<T>, ClassedReceiver<T>) {
    let (vip_tx, vip_rx) = mpsc::channel(depth);
    let (normal_tx, normal_rx) = mpsc::channel(depth);
    (
        ClassedSender { vip: vip_tx, normal: normal_tx },
        ClassedReceiver { vip: vip_rx, normal: normal_rx, vip_open: true, normal_open: true },
    )
}

/// Non-blocking send with exponential backoff (1 ms doubling to 200 ms).
///
/// Gives up (returning the message) when the receiver is gone, shutdown is
/// signalled, or the day phase leaves OPEN while the queue stays full.
pub async fn send_with_backoff<T>(
    tx: &mpsc::Sender<T>,
    mut msg: T,
    store: &Store,
) -> Result<(), T> {
    let mut delay = BACKOFF_START;
    loop {
        match tx.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(m)) => return Err(m),
            Err(TrySendError::Full(m)) => {
                if store.phase() != DayPhase::Open || store.shutdown.is_cancelled() {
                    return Err(m);
                }
                msg = m;
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(BACKOFF_CAP);
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
