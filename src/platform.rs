//! Host OS detection and executable lookup.
//!
//! Determines which engine lifecycle strategy applies to this host and
//! which package manager is usable for provisioning.

use std::path::{Path, PathBuf};

/// Host operating system, as far as the lifecycle manager cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Linux, including Windows Subsystem for Linux.
    Linux { wsl: bool },
    /// macOS; containers run inside a Podman machine.
    MacOs,
    /// Anything else; no strategy available.
    Unsupported,
}

impl HostOs {
    /// Detects the current host operating system.
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::Linux {
                wsl: Self::detect_wsl(),
            }
        }

        #[cfg(target_os = "macos")]
        {
            Self::MacOs
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Self::Unsupported
        }
    }

    #[cfg(target_os = "linux")]
    fn detect_wsl() -> bool {
        std::fs::read_to_string("/proc/version")
            .map(|v| v.to_ascii_lowercase().contains("microsoft"))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostOs::Linux { wsl: true } => write!(f, "linux (wsl)"),
            HostOs::Linux { wsl: false } => write!(f, "linux"),
            HostOs::MacOs => write!(f, "macos"),
            HostOs::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Looks up an executable by name in `$PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_returns_known_os() {
        // On any machine these tests run on, detection should not be Unsupported.
        let os = HostOs::detect();
        assert_ne!(os, HostOs::Unsupported);
    }

    #[test]
    fn test_find_in_path_sh() {
        assert!(find_in_path("sh").is_some());
    }

    #[test]
    fn test_find_in_path_missing() {
        assert!(find_in_path("definitely-not-a-real-binary-name").is_none());
    }
}
