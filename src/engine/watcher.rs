//! Detached liveness watchers.
//!
//! A watcher is a re-exec of the current executable running in its own
//! session with null stdio. It polls the acquiring process's liveness and
//! reclaims the engine once that process is gone. Everything a watcher
//! does is best-effort: failures are logged to whatever stderr it has (a
//! terminal if one is attached, nothing otherwise) and never escalate.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::defaults;
use crate::engine::machine;
use crate::engine::multiprocess::{
    filter_alive_pids, lock_record, pid_is_alive, read_owner_pids, stop_process,
    write_owner_pids,
};

/// Detach a command: null stdio, own session, no controlling terminal.
pub fn detach(command: &mut Command) -> io::Result<Child> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            command.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    command.spawn()
}

/// Spawn a detached instance of this executable with the given arguments.
pub fn spawn_self<I, S>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.args(args);
    detach(&mut command)?;
    Ok(())
}

/// Watch the owning process of a VM-backed engine instance.
///
/// Once the owner dies, it is removed from the record. The machine is only
/// torn down when no live owner remains.
pub fn watch_machine(name: &str, parent_pid: u32, record: &Path) {
    while pid_is_alive(parent_pid) {
        std::thread::sleep(defaults::WATCH_INTERVAL);
    }

    let _lock = match lock_record(record) {
        Ok(lock) => Some(lock),
        Err(err) => {
            log::warn!("could not lock owner record {}: {}", record.display(), err);
            None
        }
    };

    let mut remaining = filter_alive_pids(&read_owner_pids(record));
    remaining.retain(|&pid| pid != parent_pid);

    if !remaining.is_empty() {
        if let Err(err) = write_owner_pids(record, &remaining) {
            log::warn!("could not rewrite owner record {}: {}", record.display(), err);
        }
        return;
    }

    machine::teardown_machine(name);
    if let Err(err) = write_owner_pids(record, &[]) {
        log::warn!("could not delete owner record {}: {}", record.display(), err);
    }
}

/// Watch the owning process of a service-backed engine instance.
///
/// The service socket is keyed to a single caller, so death of the owner
/// always means teardown: graceful termination, escalation after the
/// grace period, then socket removal.
pub fn watch_service(parent_pid: u32, service_pid: u32, socket: &Path) {
    while pid_is_alive(parent_pid) {
        std::thread::sleep(defaults::WATCH_INTERVAL);
    }

    if !stop_process(service_pid, defaults::SHUTDOWN_GRACE) {
        log::warn!("service pid {} would not die", service_pid);
    }

    if let Err(err) = std::fs::remove_file(socket) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("could not remove socket {}: {}", socket.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detach_runs_command() {
        let mut command = Command::new("true");
        let mut child = detach(&mut command).unwrap();
        let status = child.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_watch_service_removes_socket_path() {
        // A dead parent and a dead service: the watcher should fall
        // straight through and clean up the socket path.
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("svc.sock");
        std::fs::write(&socket, b"").unwrap();

        watch_service(999_999_999, 999_999_998, &socket);
        assert!(!socket.exists());
    }

    #[test]
    fn test_watch_machine_rewrites_record_with_survivors() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");
        let survivor = std::process::id();
        write_owner_pids(&record, &[survivor, 999_999_997]).unwrap();

        // Parent 999_999_997 is dead; our own PID survives, so the
        // machine must not be torn down and the record must keep us.
        watch_machine("machine", 999_999_997, &record);
        assert_eq!(read_owner_pids(&record), vec![survivor]);
    }
}
