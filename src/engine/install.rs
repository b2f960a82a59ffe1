//! Engine tooling installation.
//!
//! Makes sure the `podman` CLI and a compose provider are usable before a
//! strategy starts provisioning. A host with neither the tool nor a known
//! package manager is a missing-prerequisite failure; a host where the
//! install ran but the tool still doesn't resolve is a provisioning
//! failure.

use std::process::Command;

use crate::engine::lifecycle::{LifecycleError, Result};
use crate::platform::{find_in_path, HostOs};

/// Ensure `podman` and a compose provider are installed for this host.
pub fn ensure_engine_installed(os: HostOs) -> Result<()> {
    if find_in_path("podman").is_none() {
        install_packages(os)?;
        if find_in_path("podman").is_none() {
            return Err(LifecycleError::Provisioning(
                "podman still not on PATH after installation".into(),
            ));
        }
    }

    if !compose_available() {
        // podman is present, so a package manager may still be missing;
        // compose alone is worth one install attempt.
        if install_packages(os).is_ok() && !compose_available() {
            log::warn!("no compose provider found; `docker compose` stages will fail");
        }
    }

    Ok(())
}

fn compose_available() -> bool {
    if find_in_path("podman-compose").is_some() || find_in_path("docker-compose").is_some() {
        return true;
    }

    // Recent podman ships compose as a subcommand that delegates to a
    // provider; probe it directly.
    Command::new("podman")
        .args(["compose", "version"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn install_packages(os: HostOs) -> Result<()> {
    match os {
        HostOs::MacOs => {
            let brew = find_in_path("brew").ok_or_else(|| {
                LifecycleError::MissingPrerequisite(
                    "podman is not installed and Homebrew is unavailable".into(),
                )
            })?;
            run_installer(Command::new(brew).args(["install", "podman", "podman-compose"]))
        }
        HostOs::Linux { .. } => {
            if let Some(apt) = find_in_path("apt-get") {
                return run_installer(
                    Command::new(apt).args(["install", "-y", "podman", "podman-compose"]),
                );
            }
            if let Some(dnf) = find_in_path("dnf") {
                return run_installer(
                    Command::new(dnf).args(["install", "-y", "podman", "podman-compose"]),
                );
            }
            Err(LifecycleError::MissingPrerequisite(
                "podman is not installed and no supported package manager was found".into(),
            ))
        }
        HostOs::Unsupported => Err(LifecycleError::UnsupportedOs(os.to_string())),
    }
}

fn run_installer(command: &mut Command) -> Result<()> {
    log::info!("installing engine packages: {:?}", command);
    let status = command
        .status()
        .map_err(|err| LifecycleError::Provisioning(format!("installer failed to run: {}", err)))?;

    if !status.success() {
        return Err(LifecycleError::Provisioning(format!(
            "package installation exited with {}",
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_os_is_rejected() {
        assert!(matches!(
            install_packages(HostOs::Unsupported),
            Err(LifecycleError::UnsupportedOs(_))
        ));
    }
}
