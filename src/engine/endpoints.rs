//! Published endpoint values and on-disk state layout.
//!
//! Everything downstream of `acquire` consumes exactly two values: the
//! Docker-compatible connection target and the socket path as seen from
//! inside the engine's own execution context.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// The pair of endpoint bindings published by the lifecycle manager.
#[derive(Debug, Clone, Serialize)]
pub struct DockerEndpoints {
    /// `unix://`-prefixed connection target for container-engine clients.
    #[serde(rename = "DOCKER_HOST")]
    pub docker_host: String,
    /// Socket path meaningful inside the engine's execution context, for
    /// bind-mounting into nested containers.
    #[serde(rename = "DOCKER_SOCKET")]
    pub docker_socket: String,
}

impl DockerEndpoints {
    /// Endpoints for an engine whose internal and external socket paths
    /// coincide (no VM boundary).
    pub fn from_socket(socket: &Path) -> Self {
        Self {
            docker_host: as_unix_url(socket),
            docker_socket: socket.display().to_string(),
        }
    }

    /// The bindings as environment variable pairs.
    pub fn env_pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("DOCKER_HOST", self.docker_host.as_str()),
            ("DOCKER_SOCKET", self.docker_socket.as_str()),
        ]
    }
}

/// Formats a filesystem path as a `unix://` connection URL.
pub fn as_unix_url(path: &Path) -> String {
    format!("unix://{}", path.display())
}

/// Base directory for all persisted state.
///
/// `DOCKHAND_HOME` is an escape hatch for development and tests; the
/// default lives under the user's home directory.
pub fn base_dir() -> PathBuf {
    if let Some(root) = std::env::var_os("DOCKHAND_HOME") {
        return PathBuf::from(root);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".dockhand")
}

/// Directory of owner-record files, one per named engine instance.
pub fn state_dir() -> PathBuf {
    let dir = base_dir().join("state");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Directory for per-caller service sockets.
pub fn run_dir() -> PathBuf {
    let dir = base_dir().join("run");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// The well-known per-user Podman socket path.
pub fn user_podman_socket() -> PathBuf {
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/run/user/{}/podman/podman.sock", uid))
}

/// The per-user Podman socket as advertised by the session runtime dir,
/// falling back to the fixed per-user path.
pub fn runtime_podman_socket() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("podman/podman.sock"),
        _ => user_podman_socket(),
    }
}

/// Whether a path exists and is a Unix domain socket.
#[cfg(unix)]
pub fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.file_type().is_socket(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_socket(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_unix_url() {
        let url = as_unix_url(Path::new("/tmp/podman.sock"));
        assert_eq!(url, "unix:///tmp/podman.sock");
    }

    #[test]
    fn test_from_socket_paths_match() {
        let endpoints = DockerEndpoints::from_socket(Path::new("/tmp/x.sock"));
        assert_eq!(endpoints.docker_host, "unix:///tmp/x.sock");
        assert_eq!(endpoints.docker_socket, "/tmp/x.sock");
    }

    #[test]
    fn test_env_pairs_names() {
        let endpoints = DockerEndpoints::from_socket(Path::new("/tmp/x.sock"));
        let [(host_key, _), (socket_key, _)] = endpoints.env_pairs();
        assert_eq!(host_key, "DOCKER_HOST");
        assert_eq!(socket_key, "DOCKER_SOCKET");
    }

    #[test]
    fn test_user_podman_socket_shape() {
        let path = user_podman_socket();
        let s = path.to_string_lossy();
        assert!(s.starts_with("/run/user/"));
        assert!(s.ends_with("/podman/podman.sock"));
    }

    #[test]
    fn test_is_socket_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(!is_socket(&file));
        assert!(!is_socket(&dir.path().join("missing")));
    }

    #[test]
    fn test_endpoints_serialize_with_env_names() {
        let endpoints = DockerEndpoints::from_socket(Path::new("/tmp/x.sock"));
        let json = serde_json::to_string(&endpoints).unwrap();
        assert!(json.contains("\"DOCKER_HOST\""));
        assert!(json.contains("\"DOCKER_SOCKET\""));
    }
}
