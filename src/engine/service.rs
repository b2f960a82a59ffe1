//! Service-process-backed engine lifecycle strategy.
//!
//! On Linux (including WSL) there is no VM boundary: the engine is a
//! `podman system service` process bound to a per-caller Unix socket. The
//! socket path embeds the caller's PID, so unrelated concurrent callers
//! never collide and each service has exactly one owner.

use std::io;
use std::path::PathBuf;
use std::process::Command;

use crate::defaults;
use crate::engine::endpoints::{self, is_socket, DockerEndpoints};
use crate::engine::lifecycle::{EngineStrategy, LifecycleError, Result};
use crate::engine::{install, watcher};
use crate::platform::HostOs;

/// The service-process-backed strategy.
pub struct ServiceStrategy {
    os: HostOs,
    run_dir: PathBuf,
}

impl ServiceStrategy {
    pub fn new(os: HostOs) -> Self {
        Self::with_run_dir(os, endpoints::run_dir())
    }

    /// Custom socket directory, used by tests.
    pub fn with_run_dir(os: HostOs, run_dir: PathBuf) -> Self {
        Self { os, run_dir }
    }

    /// Socket path for a given caller.
    pub fn socket_path(&self, caller_pid: u32) -> PathBuf {
        self.run_dir.join(format!("podman-docker-{}.sock", caller_pid))
    }
}

impl EngineStrategy for ServiceStrategy {
    fn name(&self) -> &'static str {
        "service"
    }

    fn provision(&self, caller_pid: u32) -> Result<DockerEndpoints> {
        install::ensure_engine_installed(self.os)?;

        std::fs::create_dir_all(&self.run_dir)?;
        let socket = self.socket_path(caller_pid);
        match std::fs::remove_file(&socket) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let socket_url = format!("unix://{}", socket.display());
        let mut command = Command::new("podman");
        command.args(["system", "service", "--time=0", socket_url.as_str()]);

        let child = watcher::detach(&mut command).map_err(|err| {
            LifecycleError::Provisioning(format!("failed to start podman system service: {}", err))
        })?;
        let service_pid = child.id();

        let mut ready = false;
        for _ in 0..defaults::SOCKET_POLL_ATTEMPTS {
            if is_socket(&socket) {
                ready = true;
                break;
            }
            std::thread::sleep(defaults::SOCKET_POLL_INTERVAL);
        }

        if !ready {
            #[cfg(unix)]
            unsafe {
                libc::kill(service_pid as libc::pid_t, libc::SIGTERM);
            }
            return Err(LifecycleError::Provisioning(format!(
                "podman system service did not create socket '{}'",
                socket.display()
            )));
        }

        let caller_arg = caller_pid.to_string();
        let service_arg = service_pid.to_string();
        let socket_arg = socket.display().to_string();
        watcher::spawn_self([
            "watch-service",
            caller_arg.as_str(),
            service_arg.as_str(),
            socket_arg.as_str(),
        ])?;

        Ok(DockerEndpoints::from_socket(&socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_embeds_caller_pid() {
        let strategy =
            ServiceStrategy::with_run_dir(HostOs::Linux { wsl: false }, PathBuf::from("/run/dh"));
        assert_eq!(
            strategy.socket_path(4321),
            PathBuf::from("/run/dh/podman-docker-4321.sock")
        );
    }

    #[test]
    fn test_socket_paths_differ_per_caller() {
        let strategy =
            ServiceStrategy::with_run_dir(HostOs::Linux { wsl: true }, PathBuf::from("/run/dh"));
        assert_ne!(strategy.socket_path(1), strategy.socket_path(2));
    }
}
