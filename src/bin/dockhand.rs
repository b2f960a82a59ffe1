//! Dockhand CLI.
//!
//! Public surface: `notify`, `run`, `run-parallel`, `ensure-docker-host`
//! and `sweep`. The `watch-machine` and `watch-service` subcommands are
//! internal; the lifecycle manager re-execs this binary with them to run
//! detached watchers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use dockhand::engine::{lifecycle, maintenance, watcher};
use dockhand::{
    notify, run_parallel, run_stage, Error, RetryPolicy, StageAction, StageOptions,
};

#[derive(Parser)]
#[command(
    name = "dockhand",
    version,
    about = "Process-scoped Podman provisioning and pipeline helpers"
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Send a notification via the configured Apprise destinations
    Notify {
        /// Notification message body
        message: String,
        /// Notification title (defaults to $JOB, then "job")
        #[arg(long)]
        title: Option<String>,
        /// Comma-separated destination URLs (defaults to $NOTIFY)
        #[arg(long)]
        url: Option<String>,
    },

    /// Run a named stage with retries and a completion marker
    Run {
        /// Stage name (used for the .<stage>.done marker)
        stage: String,
        /// Maximum number of attempts (0 performs no attempts and succeeds)
        #[arg(long, default_value_t = 1, conflicts_with = "interactive")]
        retries: u32,
        /// Retry for as long as an interactive operator confirms
        #[arg(long)]
        interactive: bool,
        /// Delay in seconds between attempts
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
        /// Notification message sent on success
        #[arg(long)]
        success_msg: Option<String>,
        /// Run the stage as a compose service instead of a command
        #[arg(long, conflicts_with = "cmd")]
        compose: Option<String>,
        /// Command to run (joined and passed to `sh -c`)
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
    },

    /// Run multiple commands concurrently and wait for all of them
    RunParallel {
        /// Command to run (repeatable)
        #[arg(short = 'c', long = "cmd", value_name = "COMMAND")]
        cmds: Vec<String>,
        /// Additional commands, one per argument
        rest: Vec<String>,
    },

    /// Ensure a Docker-compatible Podman endpoint for the given PID
    EnsureDockerHost {
        /// PID of the process that will use the endpoint
        pid: i64,
        /// Output format for the endpoint bindings
        #[arg(long, value_enum, default_value_t = OutputFormat::Export)]
        format: OutputFormat,
    },

    /// Sweep owner records: drop dead PIDs, tear down unowned engines
    Sweep,

    #[command(hide = true)]
    WatchMachine {
        name: String,
        parent_pid: u32,
        record: PathBuf,
    },

    #[command(hide = true)]
    WatchService {
        parent_pid: u32,
        service_pid: u32,
        socket: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Shell `export` lines
    Export,
    /// KEY=VALUE lines
    Env,
    /// A JSON object
    Json,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("dockhand: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

fn run(command: Cmd) -> Result<(), Error> {
    match command {
        Cmd::Notify { message, title, url } => {
            notify(&message, title.as_deref(), url.as_deref());
            Ok(())
        }

        Cmd::Run {
            stage,
            retries,
            interactive,
            delay,
            success_msg,
            compose,
            cmd,
        } => {
            let action = match compose {
                Some(service) => StageAction::Compose(service),
                None => {
                    if cmd.is_empty() {
                        // clap can't express "one of --compose or a trailing
                        // command"; enforce it here with a usage error.
                        eprintln!("dockhand: run requires a command or --compose");
                        std::process::exit(2);
                    }
                    StageAction::Command(join_shell_words(&cmd))
                }
            };

            let policy = if interactive {
                RetryPolicy::PromptOnFailure
            } else {
                RetryPolicy::Attempts(retries)
            };

            let opts = StageOptions {
                delay: Duration::from_secs_f64(delay.max(0.0)),
                success_msg,
                marker_dir: None,
            };

            run_stage(&stage, &action, policy, &opts)?;
            Ok(())
        }

        Cmd::RunParallel { cmds, rest } => {
            let all: Vec<String> = cmds.into_iter().chain(rest).collect();
            if all.is_empty() {
                eprintln!("dockhand: run-parallel requires at least one command");
                std::process::exit(2);
            }
            run_parallel(all);
            Ok(())
        }

        Cmd::EnsureDockerHost { pid, format } => {
            let endpoints = lifecycle::acquire(pid)?;
            match format {
                OutputFormat::Export => {
                    for (key, value) in endpoints.env_pairs() {
                        println!("export {}={}", key, shell_quote(value));
                    }
                }
                OutputFormat::Env => {
                    for (key, value) in endpoints.env_pairs() {
                        println!("{}={}", key, value);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string(&endpoints)?);
                }
            }
            Ok(())
        }

        Cmd::Sweep => {
            maintenance::sweep();
            Ok(())
        }

        Cmd::WatchMachine {
            name,
            parent_pid,
            record,
        } => {
            watcher::watch_machine(&name, parent_pid, &record);
            Ok(())
        }

        Cmd::WatchService {
            parent_pid,
            service_pid,
            socket,
        } => {
            watcher::watch_service(parent_pid, service_pid, &socket);
            Ok(())
        }
    }
}

/// Join argv tokens into one shell command string, quoting each token.
fn join_shell_words(words: &[String]) -> String {
    words
        .iter()
        .filter(|w| w.as_str() != "--")
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote a value for POSIX shells.
fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '='))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain_words_pass_through() {
        assert_eq!(shell_quote("unix:///tmp/x.sock"), "unix:///tmp/x.sock");
        assert_eq!(shell_quote("abc_def-1.2"), "abc_def-1.2");
    }

    #[test]
    fn test_shell_quote_wraps_specials() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_join_shell_words_drops_separator() {
        let words = vec!["--".to_string(), "echo".to_string(), "a b".to_string()];
        assert_eq!(join_shell_words(&words), "echo 'a b'");
    }
}
