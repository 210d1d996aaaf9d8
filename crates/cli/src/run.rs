// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor: owns the whole day. Acquires the owner lock, spawns the
//! guardian and every permanent agent, runs the 100 ms watch loop, drives
//! the three-phase end of day, and writes the report.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cashier;
use crate::config::Config;
use crate::day_log::DayLog;
use crate::error::exit;
use crate::gate;
use crate::generator::{self, GeneratorSettings};
use crate::lift::{self, LiftSettings, ROW_SLOTS};
use crate::lock::{LockError, OwnerLock};
use crate::msg::{self, Channels, OperatorCtl, SUPERVISOR};
use crate::operator::{Operator, OPERATOR_LOWER, OPERATOR_UPPER};
use crate::report;
use crate::store::{DayPhase, Store, StoreSettings};

/// Per-lane queue depth.
const QUEUE_DEPTH: usize = 256;
/// Pass registry capacity; the cashier refuses past it.
const PASS_CAPACITY: usize = 999_999;
/// Transit log capacity; appends past it are dropped.
const TRANSIT_CAPACITY: usize = 999_999;
/// Supervisor watch-loop cadence.
const WATCH_TICK: Duration = Duration::from_millis(100);
/// Bounded join budget during a panic shutdown.
const PANIC_GRACE: Duration = Duration::from_secs(2);

/// One permanent agent under supervision.
struct Crewman {
    name: &'static str,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

/// A fully-prepared day, ready to run. Exposed separately so tests can reach
/// the [`Store`] before and after [`PreparedDay::run`].
pub struct PreparedDay {
    pub store: Arc<Store>,
    pub channels: Channels,
    config: Config,
    lock: OwnerLock,
    close: CancellationToken,
    crew: Vec<Crewman>,
    lift: Option<JoinHandle<anyhow::Result<()>>>,
    generator: Option<JoinHandle<anyhow::Result<()>>>,
    guardian: Option<std::process::Child>,
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("ROPEWAY_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run a full simulated day; returns the process exit code.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    init_tracing(&config);
    let prepared = match prepare(config).await {
        Ok(prepared) => prepared,
        Err(err) => {
            if matches!(err.downcast_ref::<LockError>(), Some(LockError::SecondInstance)) {
                error!("another ropeway instance is already running");
                return Ok(exit::ALREADY_RUNNING);
            }
            return Err(err);
        }
    };
    prepared.run().await
}

/// Acquire the lock, build the store and channels, and spawn everything:
/// guardian first, then the permanent agents, then the generator.
pub async fn prepare(config: Config) -> anyhow::Result<PreparedDay> {
    config.validate()?;

    let lock = OwnerLock::acquire(&config.lock_file)?;
    if lock.was_dirty() {
        scrub_stale(&config.out_dir);
    }
    lock.mark_dirty().context("marking owner lock dirty")?;

    let store = Store::new(StoreSettings {
        terrain_seats: config.capacity(),
        platform_slots: ROW_SLOTS,
        day_seconds: config.day_seconds() as i64,
        pass_capacity: PASS_CAPACITY,
        transit_capacity: TRANSIT_CAPACITY,
        day_log: DayLog::new(Some(&config.out_dir)),
    });

    // Guardian before anything that could need reclaiming.
    let guardian = if config.no_guardian {
        None
    } else {
        Some(spawn_guardian().context("spawning guardian")?)
    };

    let (channels, intake) = msg::channels(config.gates as usize, QUEUE_DEPTH);

    let mut crew = Vec::new();
    crew.push(spawn_crew("cashier", cashier::run(Arc::clone(&store), intake.cashier)));
    for (i, rx) in intake.gates.into_iter().enumerate() {
        crew.push(spawn_crew("gate", gate::run(Arc::clone(&store), i as u8 + 1, rx)));
    }

    let (op1_tx, op1_rx) = mpsc::channel(16);
    let (op2_tx, op2_rx) = mpsc::channel(16);
    let operator1 = Operator::new(
        Arc::clone(&store),
        OPERATOR_LOWER,
        op1_rx,
        op2_tx.clone(),
        config.ready_timeout(),
    );
    crew.push(spawn_crew("operator-1", operator1.run(intake.platform)));

    let operator2 = Operator::new(
        Arc::clone(&store),
        OPERATOR_UPPER,
        op2_rx,
        op1_tx.clone(),
        config.ready_timeout(),
    );
    // Operator-2 has no platform desk; hand it a dead channel.
    let (dead_tx, dead_rx) = mpsc::channel(1);
    drop(dead_tx);
    crew.push(spawn_crew("operator-2", operator2.run(dead_rx)));

    let lift = tokio::spawn(lift::run(
        Arc::clone(&store),
        intake.lift,
        LiftSettings {
            rows: config.rows as usize,
            slot_capacity: ROW_SLOTS,
            tick: config.tick(),
            grace: config.lift_grace(),
        },
    ));

    let generator = tokio::spawn(generator::run(
        Arc::clone(&store),
        channels.clone(),
        GeneratorSettings {
            spawn_delay: config.spawn_delay(),
            max_active: config.max_patrons,
            platform_gates: config.platform_gates,
        },
    ));

    let close = CancellationToken::new();
    spawn_signal_task(Arc::clone(&store), close.clone(), op1_tx, op2_tx);

    Ok(PreparedDay {
        store,
        channels,
        config,
        lock,
        close,
        crew,
        lift: Some(lift),
        generator: Some(generator),
        guardian,
    })
}

fn spawn_crew(
    name: &'static str,
    agent: impl std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
) -> Crewman {
    Crewman { name, handle: Some(tokio::spawn(agent)) }
}

impl PreparedDay {
    /// Main loop plus the end-of-day procedure.
    pub async fn run(mut self) -> anyhow::Result<i32> {
        let day = Duration::from_secs(self.config.day_seconds());
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(WATCH_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_status = started;

        info!(
            capacity = self.config.capacity(),
            seconds = self.config.day_seconds(),
            gates = self.config.gates,
            rows = self.config.rows,
            "ropeway: day open"
        );

        let mut panicked = false;
        loop {
            ticker.tick().await;

            if started.elapsed() >= day {
                info!("day time elapsed");
                break;
            }
            if self.close.is_cancelled() {
                info!("termination requested");
                break;
            }
            if self.store.panicked() {
                panicked = true;
                break;
            }
            if let Some(name) = self.reap_abnormal().await {
                error!(agent = name, "permanent agent died during OPEN");
                self.store.raise_panic();
                panicked = true;
                break;
            }
            if last_status.elapsed() >= self.config.status_interval() {
                last_status = tokio::time::Instant::now();
                self.log_status(started.elapsed());
            }
        }

        if panicked {
            self.panic_shutdown().await
        } else {
            self.end_of_day().await
        }
    }

    /// Reap any permanent agent that stopped. During OPEN none of them has a
    /// reason to, so any finish is abnormal.
    async fn reap_abnormal(&mut self) -> Option<&'static str> {
        for crewman in &mut self.crew {
            let finished = crewman.handle.as_ref().is_some_and(JoinHandle::is_finished);
            if finished {
                if let Some(handle) = crewman.handle.take() {
                    log_agent_end(crewman.name, handle.await);
                }
                return Some(crewman.name);
            }
        }
        if self.lift.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = self.lift.take() {
                log_agent_end("lift", handle.await);
            }
            return Some("lift");
        }
        if self.generator.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = self.generator.take() {
                log_agent_end("generator", handle.await);
            }
            return Some("generator");
        }
        None
    }

    fn log_status(&self, elapsed: Duration) {
        let occupancy = &self.store.occupancy;
        let (clients, revenue) = {
            let stats = self.store.stats.lock();
            (stats.clients_total, stats.revenue_cents)
        };
        info!(
            elapsed_s = elapsed.as_secs(),
            terrain = occupancy.on_terrain.load(Ordering::Relaxed),
            platform = occupancy.on_platform.load(Ordering::Relaxed),
            chair = occupancy.on_chair.load(Ordering::Relaxed),
            top = occupancy.on_top.load(Ordering::Relaxed),
            active = self.store.active_patrons.load(Ordering::Relaxed),
            clients,
            revenue_cents = revenue,
            "status"
        );
    }

    /// CLOSING → DRAINING → SHUTDOWN.
    async fn end_of_day(mut self) -> anyhow::Result<i32> {
        // CLOSING: no new admissions; passes die now; stuck waiters released.
        // The generator is not killed: it sees the phase, stops spawning and
        // drains its patrons while the lift keeps delivering.
        self.store.close_day_at(self.store.now());
        self.store.advance_phase(DayPhase::Closing);
        self.store.breakdown.force_clear();

        if let Some(mut generator) = self.generator.take() {
            info!("closing: waiting for patrons to drain");
            tokio::select! {
                result = &mut generator => log_agent_end("generator", result),
                _ = tokio::time::sleep(self.config.drain_timeout()) => {
                    warn!("closing: patrons overdue, aborting generator");
                    generator.abort();
                    let _ = generator.await;
                }
            }
        }

        // DRAINING: the lift empties the platform queue and every row, then
        // exits after its grace period.
        self.store.advance_phase(DayPhase::Draining);
        if let Some(mut lift) = self.lift.take() {
            info!("draining: waiting for the lift");
            tokio::select! {
                result = &mut lift => log_agent_end("lift", result),
                _ = tokio::time::sleep(self.config.drain_timeout()) => {
                    warn!("draining: lift overdue, aborting");
                    lift.abort();
                    let _ = lift.await;
                }
            }
        }

        // SHUTDOWN: stop the remaining agents.
        self.store.advance_phase(DayPhase::Shutdown);
        self.store.shutdown.cancel();
        let forced = self.join_crew(self.config.shutdown_timeout()).await;
        self.release_guardian(forced);

        let paths = report::write(&self.store, &self.config.out_dir)
            .context("writing the daily report")?;
        info!(report = %paths.report.display(), transit = %paths.transit.display(), "report written");

        self.lock.mark_clean().context("clearing the owner lock")?;
        info!("ropeway: day complete");
        Ok(exit::OK)
    }

    /// Abnormal death of a permanent agent during OPEN: force everything
    /// down, bounded, and exit non-zero.
    async fn panic_shutdown(mut self) -> anyhow::Result<i32> {
        error!("panic shutdown: tearing the day down");
        self.store.close_day_at(self.store.now());
        self.store.advance_phase(DayPhase::Closing);
        self.store.breakdown.force_clear();
        self.store.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + PANIC_GRACE;
        if let Some(mut generator) = self.generator.take() {
            tokio::select! {
                result = &mut generator => log_agent_end("generator", result),
                _ = tokio::time::sleep_until(deadline) => { generator.abort(); let _ = generator.await; }
            }
        }
        if let Some(mut lift) = self.lift.take() {
            tokio::select! {
                result = &mut lift => log_agent_end("lift", result),
                _ = tokio::time::sleep_until(deadline) => { lift.abort(); let _ = lift.await; }
            }
        }
        self.store.advance_phase(DayPhase::Shutdown);
        let _ = self.join_crew(PANIC_GRACE).await;
        self.release_guardian(true);

        if let Err(err) = report::write(&self.store, &self.config.out_dir) {
            warn!("panic shutdown: report not written: {err}");
        }
        let _ = self.lock.mark_clean();
        Ok(exit::PANIC)
    }

    /// Join every crew task against one deadline; abort stragglers. Returns
    /// whether anything had to be aborted.
    async fn join_crew(&mut self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        let mut forced = false;
        for crewman in &mut self.crew {
            let Some(mut handle) = crewman.handle.take() else { continue };
            tokio::select! {
                result = &mut handle => log_agent_end(crewman.name, result),
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(agent = crewman.name, "agent overdue at shutdown, aborting");
                    handle.abort();
                    let _ = handle.await;
                    forced = true;
                }
            }
        }
        forced
    }

    /// Let the guardian go: SIGTERM after a clean day, SIGUSR1 (forced
    /// cleanup) when agents had to be aborted.
    fn release_guardian(&mut self, forced: bool) {
        let Some(mut child) = self.guardian.take() else { return };
        let pid = Pid::from_raw(child.id() as i32);
        let signal = if forced { Signal::SIGUSR1 } else { Signal::SIGTERM };
        let _ = kill(pid, signal);
        let _ = child.wait();
    }
}

fn log_agent_end(name: &str, result: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!(agent = name, "agent finished"),
        Ok(Err(err)) => error!(agent = name, "agent failed: {err:#}"),
        Err(err) if err.is_cancelled() => info!(agent = name, "agent cancelled"),
        Err(err) => error!(agent = name, "agent panicked: {err}"),
    }
}

/// Detach into our own process group and spawn the guardian watching it.
fn spawn_guardian() -> anyhow::Result<std::process::Child> {
    let _ = nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    let pgid = nix::unistd::getpgrp().as_raw();
    let exe = std::env::current_exe()?;
    let child = std::process::Command::new(exe)
        .arg("guardian")
        .arg("--supervisor-pid")
        .arg(std::process::id().to_string())
        .arg("--pgid")
        .arg(pgid.to_string())
        .spawn()?;
    info!(guardian = child.id(), pgid, "guardian spawned");
    Ok(child)
}

/// Remove artifacts a crashed run left behind, before creating new ones.
fn scrub_stale(out_dir: &Path) {
    warn!(dir = %out_dir.display(), "previous run crashed; scrubbing stale artifacts");
    for name in ["report.txt", "transit.csv", "day_events.jsonl"] {
        let _ = std::fs::remove_file(out_dir.join(name));
    }
}

/// Forward process signals: TERM/INT close the day (twice forces exit),
/// USR1 is a STOP for operator-1 (operator-2 if 1 is gone), USR2 a START for
/// whichever operator initiated the breakdown.
fn spawn_signal_task(
    store: Arc<Store>,
    close: CancellationToken,
    op1: mpsc::Sender<OperatorCtl>,
    op2: mpsc::Sender<OperatorCtl>,
) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();
        let mut sigusr1 = signal(SignalKind::user_defined1()).ok();
        let mut sigusr2 = signal(SignalKind::user_defined2()).ok();

        loop {
            tokio::select! {
                _ = store.shutdown.cancelled() => break,
                _ = recv_sig(&mut sigterm) => {
                    if close.is_cancelled() {
                        info!("second SIGTERM, forcing exit");
                        std::process::exit(130);
                    }
                    info!("received SIGTERM");
                    close.cancel();
                }
                _ = recv_sig(&mut sigint) => {
                    if close.is_cancelled() {
                        info!("second SIGINT, forcing exit");
                        std::process::exit(130);
                    }
                    info!("received SIGINT");
                    close.cancel();
                }
                _ = recv_sig(&mut sigusr1) => {
                    info!("SIGUSR1: forwarding STOP");
                    let target = if op1.is_closed() { &op2 } else { &op1 };
                    let _ = target.try_send(OperatorCtl::Stop { from: SUPERVISOR });
                }
                _ = recv_sig(&mut sigusr2) => {
                    match store.breakdown.initiator() {
                        1 => { let _ = op1.try_send(OperatorCtl::Start { from: SUPERVISOR }); }
                        2 => { let _ = op2.try_send(OperatorCtl::Start { from: SUPERVISOR }); }
                        _ => info!("SIGUSR2 with no breakdown initiator, ignoring"),
                    }
                }
            }
        }
    });
}

async fn recv_sig(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(ref mut s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
