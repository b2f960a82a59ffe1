//! Dockhand - process-scoped Podman provisioning and pipeline helpers.
//!
//! The core is the engine lifecycle manager: [`acquire`] guarantees a
//! Docker-compatible endpoint for the lifetime of the calling process,
//! shared with other callers in the same session and reclaimed once the
//! last of them exits. On top of it sit the small helpers shell pipelines
//! want: [`run_stage`] (retry with completion markers), [`run_parallel`]
//! (fan-out without result aggregation), and [`notify`] (best-effort
//! Apprise delivery).

mod defaults;
pub mod error;

pub mod engine;
pub mod notify;
pub mod parallel;
pub mod platform;
pub mod stage;

pub use error::{Error, Result};

pub use engine::endpoints::DockerEndpoints;
pub use engine::lifecycle::{acquire, EngineStrategy, LifecycleError};
pub use engine::multiprocess;

pub use notify::{notify, parse_destinations};
pub use parallel::run_parallel;
pub use platform::HostOs;
pub use stage::{run_stage, wait_for_files, RetryPolicy, StageAction, StageError, StageOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
