//! Engine lifecycle entry point.
//!
//! `acquire` guarantees a reachable Docker-compatible endpoint for the
//! lifetime of the calling process. An already-advertised endpoint is
//! returned as-is; otherwise a host-appropriate strategy provisions one
//! and registers the caller as an owner.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::engine::endpoints::{
    is_socket, runtime_podman_socket, user_podman_socket, DockerEndpoints,
};
use crate::platform::HostOs;

/// Errors from engine provisioning and ownership management.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Caller handed us a PID that cannot exist.
    #[error("invalid caller pid: {0}")]
    InvalidPid(i64),

    /// No tool and no way to install one.
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// Installation or startup went through the motions but the engine is
    /// still unusable.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The instance is claimed by a live process from another session.
    #[error("engine instance '{name}' is in use by pid {owner} from another session")]
    OwnershipConflict { name: String, owner: u32 },

    /// No lifecycle strategy exists for this host.
    #[error("unsupported host OS: {0}")]
    UnsupportedOs(String),

    #[error("failed to acquire lock: {0}")]
    LockFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// A host-specific way of providing an engine endpoint.
///
/// Exactly one implementation is selected per host: VM-backed on macOS,
/// service-process-backed on Linux (including WSL). Implementations own
/// the full provision path: tool installation, instance creation, owner
/// registration, and watcher spawning.
pub trait EngineStrategy {
    /// Human-readable strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Ensure an endpoint exists and register `caller_pid` as an owner.
    fn provision(&self, caller_pid: u32) -> Result<DockerEndpoints>;
}

/// Selects the lifecycle strategy for the detected host OS.
pub fn select_strategy(os: HostOs) -> Result<Box<dyn EngineStrategy>> {
    match os {
        HostOs::MacOs => Ok(Box::new(crate::engine::machine::MachineStrategy::new())),
        HostOs::Linux { .. } => Ok(Box::new(crate::engine::service::ServiceStrategy::new(os))),
        HostOs::Unsupported => Err(LifecycleError::UnsupportedOs(os.to_string())),
    }
}

/// Guarantees a reachable engine endpoint for the calling process.
///
/// Returns the externally reachable connection target and the
/// engine-internal socket path. The endpoint stays valid at least until
/// the process identified by `caller_pid` exits; reclamation afterwards is
/// best-effort (watcher poll interval plus teardown grace).
pub fn acquire(caller_pid: i64) -> Result<DockerEndpoints> {
    if caller_pid <= 0 || caller_pid > u32::MAX as i64 {
        return Err(LifecycleError::InvalidPid(caller_pid));
    }

    if let Some(existing) = externally_managed() {
        log::debug!("using externally managed engine at {}", existing.docker_host);
        return Ok(existing);
    }

    let strategy = select_strategy(HostOs::detect())?;
    log::debug!("provisioning engine via {} strategy", strategy.name());
    strategy.provision(caller_pid as u32)
}

/// An endpoint someone else already maintains, if any.
///
/// Either `$DOCKER_HOST` is advertised, or a well-known default socket is
/// present and live. Nothing is provisioned and no watcher is spawned for
/// these; an externally managed engine is never torn down by this tool.
fn externally_managed() -> Option<DockerEndpoints> {
    if let Ok(host) = std::env::var("DOCKER_HOST") {
        if !host.is_empty() {
            let socket = match host.strip_prefix("unix://") {
                Some(path) => path.to_string(),
                None => host.clone(),
            };
            return Some(DockerEndpoints {
                docker_host: host,
                docker_socket: socket,
            });
        }
    }

    for candidate in default_sockets() {
        if is_socket(&candidate) {
            return Some(DockerEndpoints::from_socket(&candidate));
        }
    }

    None
}

fn default_sockets() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("/var/run/docker.sock")];
    let runtime = runtime_podman_socket();
    candidates.push(runtime.clone());
    let fixed = user_podman_socket();
    if fixed != runtime {
        candidates.push(fixed);
    }
    candidates
}

/// Whether a path could plausibly be an owner record (the state directory
/// also holds lock and temp files).
pub(crate) fn is_record_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => ext != "lock" && ext != "tmp",
        None => true,
    }
}
