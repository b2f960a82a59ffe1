//! Cross-process coordination primitives.
//!
//! Owner records persist the set of process identifiers depending on a
//! running engine instance, one newline-separated decimal PID per line.
//! Every read-modify-write of a record happens under an exclusive advisory
//! lock on a sibling `.lock` file; writes go through a temp file and an
//! atomic rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;

/// Check whether a process is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        // Signal 0 probes existence without delivering anything. EPERM
        // still means the process exists.
        let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if result == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        true // Non-Unix: can't check liveness, assume running
    }
}

/// Whether two processes belong to the same Unix session.
///
/// Callers in the same session share an engine instance; a live owner from
/// a foreign session is an ownership conflict.
#[cfg(unix)]
pub fn same_session(a: u32, b: u32) -> bool {
    if a == b {
        return true;
    }

    let sid_a = unsafe { libc::getsid(a as libc::pid_t) };
    let sid_b = unsafe { libc::getsid(b as libc::pid_t) };
    sid_a >= 0 && sid_a == sid_b
}

#[cfg(not(unix))]
pub fn same_session(a: u32, b: u32) -> bool {
    a == b
}

/// Path of the lock file guarding an owner record.
pub fn record_lock_path(record: &Path) -> PathBuf {
    let mut name = record
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    record.with_file_name(name)
}

/// Takes the exclusive advisory lock for an owner record.
///
/// The lock is released when the returned file handle is dropped.
pub fn lock_record(record: &Path) -> io::Result<fs::File> {
    let lock = fs::File::create(record_lock_path(record))?;
    lock.lock_exclusive()?;
    Ok(lock)
}

/// Read the PIDs recorded in an owner-record file.
///
/// Unparseable lines are skipped; a missing file is an empty record.
pub fn read_owner_pids(record: &Path) -> Vec<u32> {
    let content = match fs::read_to_string(record) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|&pid| pid > 0)
        .collect()
}

/// Write an owner-record file, deduplicated and sorted.
///
/// An empty set removes the file entirely: no record means no owners.
pub fn write_owner_pids(record: &Path, pids: &[u32]) -> io::Result<()> {
    let mut unique: Vec<u32> = pids.iter().copied().filter(|&pid| pid > 0).collect();
    unique.sort_unstable();
    unique.dedup();

    if unique.is_empty() {
        match fs::remove_file(record) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        return Ok(());
    }

    let mut content = String::new();
    for pid in &unique {
        content.push_str(&pid.to_string());
        content.push('\n');
    }

    // Atomic write via temp file
    let tmp_path = record.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, record)?;
    Ok(())
}

/// Filter a list of PIDs to only those that are still alive.
pub fn filter_alive_pids(pids: &[u32]) -> Vec<u32> {
    pids.iter().copied().filter(|&pid| pid_is_alive(pid)).collect()
}

/// Stop a process, escalating from graceful to forced termination.
///
/// Sends SIGTERM, then SIGINT, then SIGKILL, waiting out the grace period
/// after each. Returns true once the process is gone.
#[cfg(unix)]
pub fn stop_process(pid: u32, grace: Duration) -> bool {
    use libc::{SIGINT, SIGKILL, SIGTERM};

    for signal in [SIGTERM, SIGINT] {
        if unsafe { libc::kill(pid as libc::pid_t, signal) } != 0 {
            return !pid_is_alive(pid);
        }
        if wait_for_exit(pid, grace) {
            return true;
        }
        log::warn!("pid {} survived signal {}, escalating", pid, signal);
    }

    unsafe { libc::kill(pid as libc::pid_t, SIGKILL) };
    wait_for_exit(pid, crate::defaults::KILL_GRACE)
}

#[cfg(not(unix))]
pub fn stop_process(_pid: u32, _grace: Duration) -> bool {
    false
}

/// Wait for a process to exit, polling at the shutdown interval.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        if !pid_is_alive(pid) {
            return true;
        }

        #[cfg(unix)]
        {
            // Reap the process if it happens to be our child.
            unsafe {
                let mut status: libc::c_int = 0;
                if libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG)
                    == pid as libc::pid_t
                {
                    return true;
                }
            }
        }

        if Instant::now() >= deadline {
            return !pid_is_alive(pid);
        }
        std::thread::sleep(crate::defaults::SHUTDOWN_POLL_INTERVAL.min(
            deadline.saturating_duration_since(Instant::now()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_is_alive_current() {
        assert!(pid_is_alive(std::process::id()));
    }

    #[test]
    fn test_pid_is_alive_zero() {
        assert!(!pid_is_alive(0));
    }

    #[test]
    fn test_same_session_with_self() {
        let pid = std::process::id();
        assert!(same_session(pid, pid));
    }

    #[test]
    fn test_owner_pids_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");

        write_owner_pids(&record, &[5678, 1234, 1234]).unwrap();
        assert_eq!(read_owner_pids(&record), vec![1234, 5678]);
    }

    #[test]
    fn test_empty_record_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");

        write_owner_pids(&record, &[42]).unwrap();
        assert!(record.exists());

        write_owner_pids(&record, &[]).unwrap();
        assert!(!record.exists());
        assert!(read_owner_pids(&record).is_empty());
    }

    #[test]
    fn test_read_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");
        std::fs::write(&record, "123\nnot-a-pid\n\n456\n0\n").unwrap();

        assert_eq!(read_owner_pids(&record), vec![123, 456]);
    }

    #[test]
    fn test_filter_alive_pids() {
        let current = std::process::id();
        let alive = filter_alive_pids(&[current, 999_999_999]);
        assert_eq!(alive, vec![current]);
    }

    #[test]
    fn test_record_lock_path() {
        let lock = record_lock_path(Path::new("/state/dockhand"));
        assert_eq!(lock, Path::new("/state/dockhand.lock"));
    }

    #[test]
    fn test_lock_record_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");

        let guard = lock_record(&record).unwrap();
        assert!(record_lock_path(&record).exists());
        drop(guard);
    }
}
