// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-of-day report and the CSV transit log.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::Store;

/// Written files, for the closing log line.
pub struct ReportPaths {
    pub report: PathBuf,
    pub transit: PathBuf,
}

/// Write `report.txt` and `transit.csv` under `out_dir`.
pub fn write(store: &Store, out_dir: &Path) -> std::io::Result<ReportPaths> {
    std::fs::create_dir_all(out_dir)?;
    let report = out_dir.join("report.txt");
    let transit = out_dir.join("transit.csv");

    write_report(store, &report)?;
    write_transit(store, &transit)?;

    Ok(ReportPaths { report, transit })
}

fn write_report(store: &Store, path: &Path) -> std::io::Result<()> {
    let stats = store.stats.lock().clone();
    let now = store.now();
    let mut out = std::fs::File::create(path)?;

    writeln!(out, "========================================")?;
    writeln!(out, "        ROPEWAY - DAILY REPORT")?;
    writeln!(out, "========================================")?;
    writeln!(out)?;
    writeln!(out, "Opened at:        {}", store.started_at)?;
    writeln!(out, "Closed at:        {now}")?;
    writeln!(out, "Duration:         {} seconds", now - store.started_at)?;
    writeln!(out)?;
    writeln!(out, "--- CLIENTS ---")?;
    writeln!(out, "Total clients:    {}", stats.clients_total)?;
    writeln!(out, "  Pedestrians:    {}", stats.pedestrians)?;
    writeln!(out, "  Cyclists:       {}", stats.cyclists)?;
    writeln!(out, "  VIPs:           {}", stats.vips)?;
    writeln!(out, "  Family groups:  {}", stats.family_groups)?;
    writeln!(out, "  Minors refused: {} (unaccompanied)", stats.minors_refused)?;
    writeln!(out)?;
    writeln!(out, "--- PASSES SOLD ---")?;
    writeln!(out, "Single-ride:      {}", stats.sold[0])?;
    writeln!(out, "Timed 30 min:     {}", stats.sold[1])?;
    writeln!(out, "Timed 60 min:     {}", stats.sold[2])?;
    writeln!(out, "Timed 120 min:    {}", stats.sold[3])?;
    writeln!(out, "Daily:            {}", stats.sold[4])?;
    writeln!(out)?;
    writeln!(out, "--- REVENUE ---")?;
    writeln!(
        out,
        "Total revenue:    {}.{:02}",
        stats.revenue_cents / 100,
        stats.revenue_cents % 100
    )?;
    writeln!(out)?;
    writeln!(out, "--- ROUTES ---")?;
    writeln!(out, "T1 (cycle, easy):   {}", stats.route_uses[0])?;
    writeln!(out, "T2 (cycle, medium): {}", stats.route_uses[1])?;
    writeln!(out, "T3 (cycle, hard):   {}", stats.route_uses[2])?;
    writeln!(out, "T4 (walking):       {}", stats.route_uses[3])?;
    writeln!(out)?;
    writeln!(out, "--- OPERATIONS ---")?;
    writeln!(out, "Rides:            {}", stats.rides)?;
    writeln!(out, "Breakdown stops:  {}", stats.stops)?;
    writeln!(out, "Transit entries:  {} ({} dropped)", store.transit.len(), store.transit.dropped())?;
    writeln!(out)?;
    writeln!(out, "========================================")?;
    Ok(())
}

fn write_transit(store: &Store, path: &Path) -> std::io::Result<()> {
    let mut out = std::fs::File::create(path)?;
    writeln!(out, "pass_id;gate_type;gate_number;timestamp")?;
    for entry in store.transit.snapshot() {
        writeln!(out, "{}", entry.csv_row())?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
