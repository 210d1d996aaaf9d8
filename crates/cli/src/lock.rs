// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner lock: single-instance guard plus crash DIRTY flag.
//!
//! The supervisor holds an exclusive advisory lock on a fixed file for its
//! whole lifetime. The file body records the run state: `1` while a run is
//! active (or after a crash), `0` after a clean shutdown. A second instance
//! fails the non-blocking lock; a DIRTY flag at startup means the previous
//! run died and its artifacts must be scrubbed before anything is created.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::warn;

const DIRTY: &str = "1";
const CLEAN: &str = "0";

#[derive(Debug)]
pub enum LockError {
    /// Another supervisor holds the lock.
    SecondInstance,
    Io(std::io::Error),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecondInstance => f.write_str("another instance holds the owner lock"),
            Self::Io(err) => write!(f, "owner lock i/o error: {err}"),
        }
    }
}

impl std::error::Error for LockError {}

impl From<std::io::Error> for LockError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// The held owner lock. Released when dropped; the DIRTY flag persists.
#[derive(Debug)]
pub struct OwnerLock {
    lock: Flock<File>,
    path: PathBuf,
    was_dirty: bool,
}

impl OwnerLock {
    /// Take the exclusive lock, reading the previous run's flag.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_file, Errno::EAGAIN)) => return Err(LockError::SecondInstance),
            Err((_file, errno)) => {
                return Err(LockError::Io(std::io::Error::from_raw_os_error(errno as i32)))
            }
        };
        let mut contents = String::new();
        let mut reader: &File = &lock;
        reader.read_to_string(&mut contents)?;
        let was_dirty = contents.trim() == DIRTY;
        if was_dirty {
            warn!(path = %path.display(), "owner lock was left dirty by a previous run");
        }
        Ok(Self { lock, path: path.to_owned(), was_dirty })
    }

    /// Whether the previous run ended without a clean shutdown.
    pub fn was_dirty(&self) -> bool {
        self.was_dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an active run. Survives a crash, so the next run sees it.
    pub fn mark_dirty(&self) -> std::io::Result<()> {
        self.write_flag(DIRTY)
    }

    /// Record a clean shutdown.
    pub fn mark_clean(&self) -> std::io::Result<()> {
        self.write_flag(CLEAN)
    }

    fn write_flag(&self, flag: &str) -> std::io::Result<()> {
        let mut file: &File = &self.lock;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(flag.as_bytes())?;
        file.flush()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
