// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only log of day-level events.
//!
//! Phase transitions and breakdown/resume events are appended as JSONL.
//! Writes are best-effort: the simulation never fails because the log can't
//! be written.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Append-only JSONL day-event log.
pub struct DayLog {
    path: Option<PathBuf>,
}

/// A single day-level event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DayEvent {
    Phase { phase: String, at: i64 },
    Breakdown { operator: u8, at: i64 },
    Resume { operator: u8, at: i64 },
    Panic { at: i64 },
}

impl DayLog {
    /// Create a day log under `out_dir`. `None` (tests) writes nothing.
    pub fn new(out_dir: Option<&Path>) -> Self {
        let path = out_dir.map(|dir| {
            let _ = std::fs::create_dir_all(dir);
            dir.join("day_events.jsonl")
        });
        Self { path }
    }

    pub fn push(&self, event: &DayEvent) {
        let Some(ref path) = self.path else { return };
        let Ok(line) = serde_json::to_string(event) else { return };
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path);
        if let Ok(mut file) = file {
            let _ = writeln!(file, "{line}");
        }
    }

    /// Read back all events (report generation and tests).
    pub fn read_all(&self) -> Vec<DayEvent> {
        let Some(ref path) = self.path else { return Vec::new() };
        let Ok(content) = std::fs::read_to_string(path) else { return Vec::new() };
        content.lines().filter_map(|l| serde_json::from_str(l).ok()).collect()
    }
}

#[cfg(test)]
#[path = "day_log_tests.rs"]
mod tests;
