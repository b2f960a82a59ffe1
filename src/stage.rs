//! Stage execution with bounded retries and completion markers.
//!
//! A stage is a named unit of pipeline work. A successful run leaves a
//! presence-only marker file behind so the stage is skipped on re-runs.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use thiserror::Error;

use crate::notify::notify;

/// Errors from running a stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("stage '{stage}' failed after {attempts} attempt(s) with exit status {status}")]
    Failed {
        stage: String,
        attempts: u32,
        status: i32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StageError>;

/// How failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most this many sequential attempts. Zero performs no attempts and
    /// reports success without ever invoking the action.
    Attempts(u32),
    /// Retry for as long as an interactive operator keeps confirming. In a
    /// non-interactive context the first failure is final.
    PromptOnFailure,
}

/// The work a stage performs.
#[derive(Debug, Clone)]
pub enum StageAction {
    /// Run the named service through the compose subsystem.
    Compose(String),
    /// Run an arbitrary shell command.
    Command(String),
}

impl StageAction {
    fn run_once(&self) -> std::io::Result<ExitStatus> {
        match self {
            StageAction::Compose(service) => Command::new("docker")
                .args(["compose", "run", "--rm", service.as_str()])
                .status(),
            StageAction::Command(command) => {
                Command::new("sh").args(["-c", command.as_str()]).status()
            }
        }
    }
}

/// Optional knobs for [`run_stage`].
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Pause between attempts.
    pub delay: Duration,
    /// Notification sent once the stage succeeds.
    pub success_msg: Option<String>,
    /// Directory holding completion markers. Defaults to `$RUN_DIR`, then
    /// the current directory.
    pub marker_dir: Option<PathBuf>,
}

/// Path of the completion marker for a stage.
pub fn marker_path(stage: &str, dir: Option<&PathBuf>) -> PathBuf {
    let dir = match dir {
        Some(dir) => dir.clone(),
        None => std::env::var_os("RUN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    dir.join(format!(".{}.done", stage))
}

/// Runs a named stage under the given retry policy.
///
/// Returns immediately if the stage's completion marker already exists. On
/// success the marker is created and the optional success notification is
/// sent. Every failure sends a notification carrying the attempt number and
/// the exit status; once the policy gives up, the final failure status is
/// returned and no marker is created.
pub fn run_stage(
    stage: &str,
    action: &StageAction,
    policy: RetryPolicy,
    opts: &StageOptions,
) -> Result<()> {
    let marker = marker_path(stage, opts.marker_dir.as_ref());
    if marker.exists() {
        log::debug!("stage '{}' already complete, skipping", stage);
        return Ok(());
    }

    match policy {
        RetryPolicy::Attempts(0) => Ok(()),
        RetryPolicy::Attempts(max) => {
            let mut last_status = 0;
            for attempt in 1..=max {
                match attempt_stage(stage, action, &marker, opts)? {
                    Ok(()) => return Ok(()),
                    Err(status) => {
                        last_status = status;
                        notify(
                            &format!(
                                "{} failed ({}/{}): exit status {}",
                                stage, attempt, max, status
                            ),
                            None,
                            None,
                        );
                        if attempt < max && !opts.delay.is_zero() {
                            std::thread::sleep(opts.delay);
                        }
                    }
                }
            }
            Err(StageError::Failed {
                stage: stage.to_string(),
                attempts: max,
                status: last_status,
            })
        }
        RetryPolicy::PromptOnFailure => {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match attempt_stage(stage, action, &marker, opts)? {
                    Ok(()) => return Ok(()),
                    Err(status) => {
                        notify(
                            &format!(
                                "{} failed (attempt {}): exit status {}",
                                stage, attempt, status
                            ),
                            None,
                            None,
                        );
                        if !confirm_retry(stage, attempt) {
                            return Err(StageError::Failed {
                                stage: stage.to_string(),
                                attempts: attempt,
                                status,
                            });
                        }
                        if !opts.delay.is_zero() {
                            std::thread::sleep(opts.delay);
                        }
                    }
                }
            }
        }
    }
}

/// One attempt. `Ok(Ok(()))` means the stage succeeded and the marker was
/// written; `Ok(Err(status))` is an action failure with its exit status.
fn attempt_stage(
    stage: &str,
    action: &StageAction,
    marker: &std::path::Path,
    opts: &StageOptions,
) -> Result<std::result::Result<(), i32>> {
    let status = action.run_once()?;
    if !status.success() {
        return Ok(Err(status_code(status)));
    }

    std::fs::write(marker, b"")?;
    if let Some(msg) = &opts.success_msg {
        notify(msg, None, None);
    }
    log::info!("stage '{}' complete", stage);
    Ok(Ok(()))
}

/// Asks the operator whether to retry. Non-interactive stdin, an unreadable
/// prompt, or any non-affirmative answer stops the retry loop.
fn confirm_retry(stage: &str, attempt: u32) -> bool {
    if !std::io::stdin().is_terminal() {
        return false;
    }

    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "[{}] failed (attempt {}). Retry stage '{}'? [y/N]: ",
        stage, attempt, stage
    );
    let _ = stderr.flush();

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

/// Block until every listed path exists, polling at the given interval.
///
/// Pipelines use this to wait for artifacts produced by concurrently
/// running stages.
pub fn wait_for_files<P: AsRef<std::path::Path>>(paths: &[P], interval: Duration) {
    loop {
        if paths.iter().all(|p| p.as_ref().exists()) {
            return;
        }
        std::thread::sleep(interval);
    }
}

fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
