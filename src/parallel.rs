//! Concurrent fan-out of independent shell commands.

use std::process::Command;

/// Runs each non-empty command concurrently and waits for all of them.
///
/// Every command is launched as its own `sh -c` child process. Individual
/// exit statuses are logged but never propagated; a failing command neither
/// cancels nor affects its siblings. Completion order is unspecified.
pub fn run_parallel<I, S>(commands: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut children = Vec::new();

    for command in commands {
        let command = command.as_ref();
        if command.is_empty() {
            continue;
        }

        match Command::new("sh").arg("-c").arg(command).spawn() {
            Ok(child) => children.push((command.to_string(), child)),
            Err(err) => log::warn!("failed to launch '{}': {}", command, err),
        }
    }

    for (command, mut child) in children {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => log::warn!("'{}' exited with {}", command, status),
            Err(err) => log::warn!("failed to wait for '{}': {}", command, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_commands_complete_despite_failure() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let c = dir.path().join("c");

        run_parallel([
            format!("touch {}", a.display()),
            "exit 3".to_string(),
            format!("touch {}", c.display()),
        ]);

        // The failing middle command must not stop the others.
        assert!(a.exists());
        assert!(c.exists());
    }

    #[test]
    fn test_empty_commands_are_skipped() {
        run_parallel(["", ""]);
    }

    #[test]
    fn test_no_commands() {
        run_parallel(Vec::<String>::new());
    }
}
