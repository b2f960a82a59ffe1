//! VM-backed engine lifecycle strategy.
//!
//! On macOS the engine runs inside a Podman machine, one fixed name per
//! host. The machine is created lazily, sized from host resources, and
//! shared by every caller in the same session; its owner record tracks the
//! set of depending PIDs.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::defaults;
use crate::engine::endpoints::{self, as_unix_url, DockerEndpoints};
use crate::engine::lifecycle::{EngineStrategy, LifecycleError, Result};
use crate::engine::multiprocess::{
    filter_alive_pids, lock_record, read_owner_pids, same_session, write_owner_pids,
};
use crate::engine::{install, maintenance, podman, podman_capture, watcher};
use crate::platform::HostOs;

/// Machine metadata as reported by `podman machine inspect`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct MachineInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub rootful: Option<bool>,
    #[serde(default)]
    pub connection_info: Option<ConnectionInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ConnectionInfo {
    #[serde(default)]
    pub podman_socket: Option<SocketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SocketInfo {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "URI", default)]
    pub uri: Option<String>,
}

/// One entry of `podman system connection ls --format json`.
#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    #[serde(rename = "URI", default)]
    uri: Option<String>,
    #[serde(rename = "Default", default)]
    default: bool,
}

/// The VM-backed strategy.
pub struct MachineStrategy {
    machine_name: String,
    state_dir: PathBuf,
}

impl MachineStrategy {
    pub fn new() -> Self {
        Self::with_state_dir(endpoints::state_dir())
    }

    /// Custom state directory, used by tests.
    pub fn with_state_dir(state_dir: PathBuf) -> Self {
        Self {
            machine_name: defaults::MACHINE_NAME.to_string(),
            state_dir,
        }
    }

    fn init_machine(&self) {
        let cpus = host_cpus();
        let memory_mb = scale_memory_mb(host_memory_bytes());
        let disk_gb = scale_disk_gb(host_disk_kb());

        log::info!(
            "creating machine '{}' ({} cpus, {} MB memory, {} GB disk)",
            self.machine_name,
            cpus,
            memory_mb,
            disk_gb
        );

        let cpus_arg = cpus.to_string();
        let memory_arg = memory_mb.to_string();
        let disk_arg = disk_gb.to_string();
        podman(&[
            "machine",
            "init",
            self.machine_name.as_str(),
            "--cpus",
            cpus_arg.as_str(),
            "--memory",
            memory_arg.as_str(),
            "--disk-size",
            disk_arg.as_str(),
            "--volume",
            "/Users:/Users",
            "--volume",
            "/Volumes:/Volumes",
        ]);
    }

    /// Internal socket path, resolved through the documented chain:
    /// machine metadata, rootless override, default connection, and the
    /// fixed per-user path as the last resort.
    fn resolve_internal_socket(&self, info: &MachineInfo) -> String {
        let mut socket = info
            .connection_info
            .as_ref()
            .and_then(|c| c.podman_socket.as_ref())
            .and_then(|s| s.uri.as_deref())
            .and_then(uri_path_component);

        if !info.rootful.unwrap_or(true) {
            socket = Some(endpoints::user_podman_socket().display().to_string());
        }

        if socket.is_none() {
            socket = default_connection_socket();
        }

        socket.unwrap_or_else(|| endpoints::user_podman_socket().display().to_string())
    }
}

impl Default for MachineStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStrategy for MachineStrategy {
    fn name(&self) -> &'static str {
        "machine"
    }

    fn provision(&self, caller_pid: u32) -> Result<DockerEndpoints> {
        install::ensure_engine_installed(HostOs::MacOs)?;

        std::fs::create_dir_all(&self.state_dir)?;
        let record = self.state_dir.join(&self.machine_name);

        let lock = lock_record(&record)
            .map_err(|err| LifecycleError::LockFailed(err.to_string()))?;

        let recorded = read_owner_pids(&record);
        let live = check_ownership(&record, caller_pid, &self.machine_name)?;

        let mut info = inspect_machine(&self.machine_name)?;

        if live.is_empty() && !recorded.is_empty() {
            log::info!(
                "machine '{}' owners are all dead, reclaiming",
                self.machine_name
            );
            if info.is_some() {
                remove_machine(&self.machine_name);
                info = None;
            }
            write_owner_pids(&record, &[])?;
        }

        let state = match &info {
            Some(info) => info.state.clone(),
            None => {
                self.init_machine();
                "stopped".to_string()
            }
        };

        if state != "running" {
            podman(&["machine", "start", self.machine_name.as_str()]);
        }

        let mut owners = live;
        owners.push(caller_pid);
        write_owner_pids(&record, &owners)?;
        drop(lock);

        let info = inspect_machine(&self.machine_name)?.ok_or_else(|| {
            LifecycleError::Provisioning(format!(
                "machine '{}' is not inspectable after start",
                self.machine_name
            ))
        })?;

        let host_socket = info
            .connection_info
            .as_ref()
            .and_then(|c| c.podman_socket.as_ref())
            .and_then(|s| s.path.as_deref())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                LifecycleError::Provisioning(format!(
                    "failed to determine host-side Docker API socket path for '{}'",
                    self.machine_name
                ))
            })?
            .to_string();

        let internal_socket = self.resolve_internal_socket(&info);

        let pid_arg = caller_pid.to_string();
        let record_arg = record.display().to_string();
        watcher::spawn_self([
            "watch-machine",
            self.machine_name.as_str(),
            pid_arg.as_str(),
            record_arg.as_str(),
        ])?;

        if let Err(err) = maintenance::install_maintenance_job() {
            log::warn!("could not install maintenance job: {}", err);
        }

        Ok(DockerEndpoints {
            docker_host: as_unix_url(Path::new(&host_socket)),
            docker_socket: internal_socket,
        })
    }
}

/// Live owners of the record, or an ownership conflict.
///
/// A live recorded PID from a different Unix session than the caller
/// means the instance belongs to someone else; same-session owners share.
/// Callers must hold the record lock.
pub fn check_ownership(record: &Path, caller_pid: u32, instance: &str) -> Result<Vec<u32>> {
    let live = filter_alive_pids(&read_owner_pids(record));

    if let Some(&foreign) = live
        .iter()
        .find(|&&pid| pid != caller_pid && !same_session(pid, caller_pid))
    {
        return Err(LifecycleError::OwnershipConflict {
            name: instance.to_string(),
            owner: foreign,
        });
    }

    Ok(live)
}

/// Inspect a machine; `None` means no machine exists under that name.
pub(crate) fn inspect_machine(name: &str) -> Result<Option<MachineInfo>> {
    let Some(raw) = podman_capture(&["machine", "inspect", name]) else {
        return Ok(None);
    };

    let mut machines: Vec<MachineInfo> = serde_json::from_str(&raw)?;
    Ok(if machines.is_empty() {
        None
    } else {
        Some(machines.swap_remove(0))
    })
}

/// Prune stale engine-side resources, then stop the machine.
///
/// Used by watchers and the maintenance sweep once the last owner is
/// gone. Best-effort throughout.
pub fn teardown_machine(name: &str) {
    let until_arg = format!("until={}", defaults::PRUNE_WINDOW);
    podman(&[
        "machine",
        "ssh",
        name,
        "--",
        "podman",
        "system",
        "prune",
        "-a",
        "--volumes",
        "--force",
        "--filter",
        until_arg.as_str(),
    ]);
    podman(&["machine", "stop", name]);
}

fn remove_machine(name: &str) {
    podman(&["machine", "stop", name]);
    podman(&["machine", "rm", "-f", name]);
}

fn default_connection_socket() -> Option<String> {
    let raw = podman_capture(&["system", "connection", "ls", "--format", "json"])?;
    let entries: Vec<ConnectionEntry> = serde_json::from_str(&raw).ok()?;
    entries
        .into_iter()
        .find(|e| e.default)
        .and_then(|e| e.uri)
        .as_deref()
        .and_then(uri_path_component)
}

/// The path component of a connection URI, e.g.
/// `ssh://core@localhost:50022/run/podman/podman.sock` becomes
/// `/run/podman/podman.sock`.
fn uri_path_component(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("://")?;
    let slash = rest.find('/')?;
    Some(rest[slash..].to_string())
}

fn host_cpus() -> u64 {
    crate::engine::capture("sysctl", &["-n", "hw.ncpu"])
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

fn host_memory_bytes() -> u64 {
    crate::engine::capture("sysctl", &["-n", "hw.memsize"])
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn host_disk_kb() -> u64 {
    let Some(out) = crate::engine::capture("df", &["-k", "/"]) else {
        return 0;
    };
    out.lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|field| field.parse().ok())
        .unwrap_or(0)
}

fn scale_memory_mb(bytes: u64) -> u64 {
    let mb = bytes / 1024 / 1024 * defaults::HOST_SHARE_PERCENT / 100;
    mb.max(defaults::MIN_MEMORY_MB)
}

fn scale_disk_gb(kb: u64) -> u64 {
    let gb = kb * defaults::HOST_SHARE_PERCENT / 100 / 1024 / 1024;
    gb.max(defaults::MIN_DISK_GB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_memory_floors_at_minimum() {
        assert_eq!(scale_memory_mb(0), defaults::MIN_MEMORY_MB);
        assert_eq!(scale_memory_mb(256 * 1024 * 1024), defaults::MIN_MEMORY_MB);
    }

    #[test]
    fn test_scale_memory_takes_host_share() {
        // 16 GiB of host memory: 80% of 16384 MB.
        assert_eq!(scale_memory_mb(16 * 1024 * 1024 * 1024), 13107);
    }

    #[test]
    fn test_scale_disk_floors_at_minimum() {
        assert_eq!(scale_disk_gb(0), defaults::MIN_DISK_GB);
        assert_eq!(scale_disk_gb(1024), defaults::MIN_DISK_GB);
    }

    #[test]
    fn test_scale_disk_takes_host_share() {
        // 500 GB of disk in KB: 80% is 400 GB.
        let kb = 500u64 * 1024 * 1024;
        assert_eq!(scale_disk_gb(kb), 400);
    }

    #[test]
    fn test_uri_path_component() {
        assert_eq!(
            uri_path_component("ssh://core@localhost:50022/run/podman/podman.sock").as_deref(),
            Some("/run/podman/podman.sock")
        );
        assert_eq!(
            uri_path_component("unix:///run/user/1000/podman/podman.sock").as_deref(),
            Some("/run/user/1000/podman/podman.sock")
        );
        assert_eq!(uri_path_component("not-a-uri"), None);
        assert_eq!(uri_path_component("ssh://host-without-path"), None);
    }

    #[test]
    fn test_machine_info_parses_inspect_json() {
        let raw = r#"[{
            "Name": "dockhand",
            "State": "running",
            "Rootful": false,
            "ConnectionInfo": {
                "PodmanSocket": {
                    "Path": "/Users/dev/.local/share/containers/podman/machine/dockhand/podman.sock"
                }
            }
        }]"#;

        let machines: Vec<MachineInfo> = serde_json::from_str(raw).unwrap();
        let info = &machines[0];
        assert_eq!(info.state, "running");
        assert_eq!(info.rootful, Some(false));
        let path = info
            .connection_info
            .as_ref()
            .unwrap()
            .podman_socket
            .as_ref()
            .unwrap()
            .path
            .as_deref()
            .unwrap();
        assert!(path.ends_with("podman.sock"));
    }

    #[test]
    fn test_check_ownership_dead_pids_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");
        std::fs::write(&record, "999999999\n").unwrap();

        let live = check_ownership(&record, std::process::id(), "machine").unwrap();
        assert!(live.is_empty());
    }

    #[test]
    fn test_check_ownership_accepts_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");
        let pid = std::process::id();
        write_owner_pids(&record, &[pid]).unwrap();

        let live = check_ownership(&record, pid, "machine").unwrap();
        assert_eq!(live, vec![pid]);
    }

    #[test]
    fn test_check_ownership_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("machine");

        let live = check_ownership(&record, std::process::id(), "machine").unwrap();
        assert!(live.is_empty());
    }
}
