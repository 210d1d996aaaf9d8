// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Chairlift resort simulator for a single operating day.
#[derive(Debug, Clone, Parser)]
#[command(name = "ropeway", version, about)]
pub struct Config {
    /// Terrain capacity: max people inside the lower-station area.
    #[arg(value_name = "N", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub capacity: Option<u32>,

    /// Length of the simulated day in seconds.
    #[arg(value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub day_seconds: Option<u64>,

    /// Number of entry gates at the lower station.
    #[arg(long, env = "ROPEWAY_GATES", default_value = "4")]
    pub gates: u8,

    /// Number of platform gates (gate-2) patrons pass on their way to the lift.
    #[arg(long, env = "ROPEWAY_PLATFORM_GATES", default_value = "3")]
    pub platform_gates: u8,

    /// Number of chair rows on the ring. Must be even: the upper station sits
    /// at the halfway position.
    #[arg(long, env = "ROPEWAY_ROWS", default_value = "18")]
    pub rows: u16,

    /// Lift tick interval in milliseconds.
    #[arg(long = "tick-ms", env = "ROPEWAY_TICK_MS", default_value = "200")]
    pub tick_ms: u64,

    /// Delay between patron spawns in milliseconds.
    #[arg(long = "spawn-delay-ms", env = "ROPEWAY_SPAWN_DELAY_MS", default_value = "150")]
    pub spawn_delay_ms: u64,

    /// Max patron agents alive at once.
    #[arg(long, env = "ROPEWAY_MAX_PATRONS", default_value = "60000")]
    pub max_patrons: u32,

    /// Directory for the report, transit CSV and day-event log.
    #[arg(long, env = "ROPEWAY_OUT_DIR", default_value = "output")]
    pub out_dir: PathBuf,

    /// Owner lock file (single-instance guard + crash DIRTY flag).
    #[arg(long, env = "ROPEWAY_LOCK_FILE", default_value = "/tmp/ropeway_owner.lock")]
    pub lock_file: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "ROPEWAY_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ROPEWAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Skip spawning the guardian sibling process.
    #[arg(long, hide = true)]
    pub no_guardian: bool,
}

/// Default terrain capacity when the positional is omitted.
pub const DEFAULT_CAPACITY: u32 = 100;
/// Default day length when the positional is omitted.
pub const DEFAULT_DAY_SECONDS: u64 = 300;

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gates == 0 {
            anyhow::bail!("--gates must be at least 1");
        }
        if self.platform_gates == 0 {
            anyhow::bail!("--platform-gates must be at least 1");
        }
        if self.rows < 2 || self.rows % 2 != 0 {
            anyhow::bail!("--rows must be an even number >= 2");
        }
        if self.tick_ms == 0 {
            anyhow::bail!("--tick-ms must be positive");
        }
        if self.max_patrons == 0 {
            anyhow::bail!("--max-patrons must be positive");
        }
        Ok(())
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.unwrap_or(DEFAULT_CAPACITY)
    }

    pub fn day_seconds(&self) -> u64 {
        self.day_seconds.unwrap_or(DEFAULT_DAY_SECONDS)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn spawn_delay(&self) -> Duration {
        Duration::from_millis(self.spawn_delay_ms)
    }

    /// How long the supervisor waits for the lift to drain before aborting it.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// How long the supervisor waits for permanent agents at SHUTDOWN.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(8)
    }

    /// Grace period the lift sleeps after draining before it exits.
    pub fn lift_grace(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Bound on the STOP-side READY handshake.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    /// Interval between supervisor status log lines.
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(30)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
