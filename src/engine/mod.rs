//! Container engine lifecycle management.
//!
//! This module provides:
//! - Endpoint values and state layout (`endpoints`)
//! - Cross-process coordination (`multiprocess`)
//! - Tooling installation (`install`)
//! - Host-specific lifecycle strategies (`machine`, `service`)
//! - Detached liveness watchers (`watcher`)
//! - The periodic owner-record sweep (`maintenance`)

pub mod endpoints;
pub mod install;
pub mod lifecycle;
pub mod machine;
pub mod maintenance;
pub mod multiprocess;
pub mod service;
pub mod watcher;

pub use endpoints::DockerEndpoints;
pub use lifecycle::{acquire, EngineStrategy, LifecycleError};

use std::io::IsTerminal;
use std::process::Command;

/// Run a capturing command, returning trimmed stdout on success.
pub(crate) fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

/// Run a podman command best-effort, echoing it when a terminal is
/// attached. Returns whether the command reported success.
pub(crate) fn podman(args: &[&str]) -> bool {
    if std::io::stderr().is_terminal() {
        eprintln!("+ podman {}", args.join(" "));
    }
    match Command::new("podman").args(args).status() {
        Ok(status) => status.success(),
        Err(err) => {
            log::warn!("podman {:?} failed to run: {}", args, err);
            false
        }
    }
}

/// Run a capturing podman command.
pub(crate) fn podman_capture(args: &[&str]) -> Option<String> {
    capture("podman", args)
}
