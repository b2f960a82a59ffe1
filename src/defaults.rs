//! Fixed operational constants.

use std::time::Duration;

/// Name of the Podman machine managed on VM-backed hosts. One per host.
pub const MACHINE_NAME: &str = "dockhand";

/// Disposable container image used for notification delivery.
pub const APPRISE_IMAGE: &str = "caronc/apprise:latest";

/// Notification title used when neither an override nor `$JOB` is set.
pub const FALLBACK_TITLE: &str = "job";

/// Interval between liveness polls of a watched process.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Socket-readiness poll: attempts and spacing (5 seconds total).
pub const SOCKET_POLL_ATTEMPTS: u32 = 50;
pub const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period for a service process to exit after a termination signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Poll spacing while waiting for a signalled process to exit.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period after SIGKILL before giving up on a process.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Share of host memory and disk granted to a new machine, in percent.
pub const HOST_SHARE_PERCENT: u64 = 80;

/// Floors for machine sizing.
pub const MIN_MEMORY_MB: u64 = 512;
pub const MIN_DISK_GB: u64 = 10;

/// Age filter for engine-side pruning at teardown (30 days).
pub const PRUNE_WINDOW: &str = "720h";

/// Period of the host-wide maintenance sweep, in seconds.
pub const SWEEP_INTERVAL_SECS: u32 = 3600;

/// launchd label for the maintenance agent.
pub const LAUNCHD_LABEL: &str = "com.dockhand.sweep";
