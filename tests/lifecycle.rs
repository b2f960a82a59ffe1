//! Owner-record and watcher integration tests.
//!
//! These exercise the shared-state machinery against real processes:
//! children in this session, detached children in foreign sessions, and
//! watchers observing process death. No container engine is required.

use std::process::Command;

use dockhand::engine::machine::check_ownership;
use dockhand::engine::watcher;
use dockhand::multiprocess::{read_owner_pids, write_owner_pids};
use dockhand::LifecycleError;

#[test]
fn foreign_session_owner_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("machine");

    // A detached child runs in its own session; its live PID in the
    // record must block acquisition without touching anything.
    let mut child = watcher::detach(Command::new("sleep").arg("30")).unwrap();
    let foreign_pid = child.id();
    write_owner_pids(&record, &[foreign_pid]).unwrap();

    let result = check_ownership(&record, std::process::id(), "machine");
    match result {
        Err(LifecycleError::OwnershipConflict { name, owner }) => {
            assert_eq!(name, "machine");
            assert_eq!(owner, foreign_pid);
        }
        other => panic!("expected ownership conflict, got {:?}", other),
    }

    // The record itself must be unmodified.
    assert_eq!(read_owner_pids(&record), vec![foreign_pid]);

    child.kill().unwrap();
    child.wait().unwrap();
}

#[test]
fn same_session_owner_is_shared() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("machine");

    // A plain child shares our session, so its live PID is a co-owner,
    // not a conflict.
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let sibling_pid = child.id();
    write_owner_pids(&record, &[sibling_pid]).unwrap();

    let live = check_ownership(&record, std::process::id(), "machine").unwrap();
    assert_eq!(live, vec![sibling_pid]);

    child.kill().unwrap();
    child.wait().unwrap();
}

#[test]
fn watcher_releases_dead_owner_within_poll_window() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("machine");

    // A short-lived owner plus ourselves. Once the owner exits, the
    // watcher must drop it from the record and, because we survive,
    // leave the record (and the engine) alone.
    let mut child = Command::new("sleep").arg("1").spawn().unwrap();
    let owner_pid = child.id();
    let our_pid = std::process::id();
    write_owner_pids(&record, &[owner_pid, our_pid]).unwrap();

    // Reap the child in the background so the PID fully dies.
    let reaper = std::thread::spawn(move || {
        let _ = child.wait();
    });

    watcher::watch_machine("machine", owner_pid, &record);
    reaper.join().unwrap();

    assert_eq!(read_owner_pids(&record), vec![our_pid]);
}
