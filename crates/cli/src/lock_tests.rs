// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn lock_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("owner.lock")
}

#[test]
fn a_fresh_lock_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let lock = OwnerLock::acquire(&lock_path(&dir)).unwrap();
    assert!(!lock.was_dirty());
}

#[test]
fn a_second_acquire_is_refused_while_held() {
    let dir = tempfile::tempdir().unwrap();
    let path = lock_path(&dir);
    let _held = OwnerLock::acquire(&path).unwrap();
    match OwnerLock::acquire(&path) {
        Err(LockError::SecondInstance) => {}
        other => panic!("expected SecondInstance, got {other:?}"),
    }
}

#[test]
fn a_crashed_run_leaves_the_dirty_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = lock_path(&dir);
    {
        let lock = OwnerLock::acquire(&path).unwrap();
        lock.mark_dirty().unwrap();
        // Dropped without mark_clean: the crash case.
    }
    let lock = OwnerLock::acquire(&path).unwrap();
    assert!(lock.was_dirty());
}

#[test]
fn a_clean_shutdown_clears_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = lock_path(&dir);
    {
        let lock = OwnerLock::acquire(&path).unwrap();
        lock.mark_dirty().unwrap();
        lock.mark_clean().unwrap();
    }
    let lock = OwnerLock::acquire(&path).unwrap();
    assert!(!lock.was_dirty());
}

#[test]
fn the_lock_is_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = lock_path(&dir);
    drop(OwnerLock::acquire(&path).unwrap());
    // Reacquirable immediately.
    let _lock = OwnerLock::acquire(&path).unwrap();
}

#[test]
fn mark_dirty_truncates_older_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = lock_path(&dir);
    std::fs::write(&path, "0 leftover garbage").unwrap();
    {
        let lock = OwnerLock::acquire(&path).unwrap();
        assert!(!lock.was_dirty());
        lock.mark_dirty().unwrap();
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
}
