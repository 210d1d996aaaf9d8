// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guardian sibling process.
//!
//! Spawned by the supervisor before any worker, in its own process group so
//! the supervisor's group-kill cannot reach it. It idles until the
//! supervisor exits. A SIGTERM while the supervisor is still alive is the
//! clean-shutdown goodbye: exit without touching anything. If the supervisor
//! pid stops resolving to the supervisor executable (any abnormal death,
//! SIGKILL included) or a forced-cleanup SIGUSR1 arrives, the guardian tears
//! the simulation process group down and sweeps surviving processes of the
//! same executable. The owner lock stays DIRTY for the next run to observe.

use std::os::unix::fs::MetadataExt;
use std::time::Duration;

use clap::Args;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Executable name the supervisor (and every sibling) runs under.
const BINARY_NAME: &str = "ropeway";
/// How often the guardian re-checks the supervisor's liveness.
const WATCH_INTERVAL: Duration = Duration::from_millis(200);
/// Grace between SIGTERM and SIGKILL when tearing the group down.
const KILL_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Args)]
pub struct GuardianArgs {
    /// Pid of the supervisor to watch.
    #[arg(long)]
    pub supervisor_pid: i32,

    /// Process group of the simulation, torn down on abnormal death.
    #[arg(long)]
    pub pgid: i32,
}

/// Run the guardian until the supervisor goes away, one way or the other.
pub async fn run(args: &GuardianArgs) -> i32 {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    // Detach into our own process group; the teardown killpg must not be
    // suicide.
    let _ = nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    // Even a SIGKILLed supervisor wakes us up.
    let _ = nix::sys::prctl::set_pdeathsig(Signal::SIGTERM);

    // The supervisor may already be gone by the time we armed the above.
    if !supervisor_alive(args.supervisor_pid) {
        cleanup(args);
        return 0;
    }

    info!(supervisor = args.supervisor_pid, pgid = args.pgid, "guardian: watching");

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();
    let mut sigusr1 = signal(SignalKind::user_defined1()).ok();

    loop {
        tokio::select! {
            _ = async {
                match sigterm {
                    Some(ref mut s) => { s.recv().await; }
                    None => std::future::pending().await,
                }
            } => {
                if supervisor_alive(args.supervisor_pid) {
                    info!("guardian: released by the supervisor, exiting clean");
                    return 0;
                }
                cleanup(args);
                return 0;
            }
            _ = async {
                match sigint {
                    Some(ref mut s) => { s.recv().await; }
                    None => std::future::pending().await,
                }
            } => {
                if supervisor_alive(args.supervisor_pid) {
                    return 0;
                }
                cleanup(args);
                return 0;
            }
            _ = async {
                match sigusr1 {
                    Some(ref mut s) => { s.recv().await; }
                    None => std::future::pending().await,
                }
            } => {
                warn!("guardian: forced cleanup requested");
                cleanup(args);
                return 0;
            }
            _ = tokio::time::sleep(WATCH_INTERVAL) => {
                if !supervisor_alive(args.supervisor_pid) {
                    cleanup(args);
                    return 0;
                }
            }
        }
    }
}

/// Whether `pid` still resolves to the supervisor executable. A recycled pid
/// running something else does not count.
fn supervisor_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/comm")) {
        Ok(comm) => comm.trim() == BINARY_NAME,
        Err(_) => false,
    }
}

/// Tear down the simulation: TERM the group, brief grace, KILL the group,
/// then sweep any survivor of the same executable owned by this user.
fn cleanup(args: &GuardianArgs) {
    warn!(pgid = args.pgid, "guardian: supervisor is gone, reclaiming");
    if args.pgid > 1 {
        let group = Pid::from_raw(args.pgid);
        let _ = killpg(group, Signal::SIGTERM);
        std::thread::sleep(KILL_GRACE);
        let _ = killpg(group, Signal::SIGKILL);
        std::thread::sleep(KILL_GRACE);
    }
    let survivors = sweep_survivors();
    if survivors > 0 {
        warn!(survivors, "guardian: killed stray processes by executable name");
    }
    info!("guardian: done");
}

/// SIGKILL every process of this user whose executable name matches ours,
/// excluding the guardian itself. Returns how many were hit.
fn sweep_survivors() -> usize {
    let own_pid = std::process::id() as i32;
    let own_uid = nix::unistd::getuid().as_raw();
    let Ok(entries) = std::fs::read_dir("/proc") else { return 0 };

    let mut hit = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else { continue };
        if pid == own_pid {
            continue;
        }
        let Ok(comm) = std::fs::read_to_string(format!("/proc/{pid}/comm")) else { continue };
        if comm.trim() != BINARY_NAME {
            continue;
        }
        let Ok(meta) = std::fs::metadata(format!("/proc/{pid}")) else { continue };
        if meta.uid() != own_uid {
            continue;
        }
        if kill(Pid::from_raw(pid), Signal::SIGKILL).is_ok() {
            hit += 1;
        }
    }
    hit
}

#[cfg(test)]
#[path = "guardian_tests.rs"]
mod tests;
