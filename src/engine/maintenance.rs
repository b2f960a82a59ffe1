//! Host-wide owner-record maintenance.
//!
//! Watchers die with the host (sleep, reboot, kill -9), so a periodic
//! sweep over the state directory backstops them: dead PIDs are dropped
//! from every record, and a record with no live owners triggers the same
//! prune-then-stop teardown a watcher would have performed. The sweep is
//! idempotent and independent of any acquire call.

use std::io;
use std::path::Path;
use std::process::Command;

use crate::defaults;
use crate::engine::endpoints;
use crate::engine::lifecycle::is_record_file;
use crate::engine::machine::teardown_machine;
use crate::engine::multiprocess::{filter_alive_pids, lock_record, read_owner_pids, write_owner_pids};

/// Sweep the default state directory. Never fails; every problem is
/// logged and skipped.
pub fn sweep() {
    sweep_dir(&endpoints::state_dir());
}

/// Sweep one state directory.
pub fn sweep_dir(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("cannot read state dir {}: {}", dir.display(), err);
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() || !is_record_file(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };

        let _lock = match lock_record(&path) {
            Ok(lock) => lock,
            Err(err) => {
                log::warn!("cannot lock record {}: {}", path.display(), err);
                continue;
            }
        };

        let recorded = read_owner_pids(&path);
        let live = filter_alive_pids(&recorded);

        if live.is_empty() {
            log::info!("record '{}' has no live owners, tearing down", name);
            teardown_machine(&name);
            if let Err(err) = std::fs::remove_file(&path) {
                log::warn!("cannot remove record {}: {}", path.display(), err);
            }
        } else if live.len() != recorded.len() {
            if let Err(err) = write_owner_pids(&path, &live) {
                log::warn!("cannot rewrite record {}: {}", path.display(), err);
            }
        }
    }
}

/// Install the periodic sweep as a launchd agent: hourly and at login.
///
/// The sweep script and the agent plist are rewritten, and the agent
/// reloaded, only when their content actually changed.
pub fn install_maintenance_job() -> io::Result<()> {
    let exe = std::env::current_exe()?;

    let base = endpoints::base_dir();
    std::fs::create_dir_all(&base)?;

    let script_path = base.join("sweep.sh");
    let script = format!("#!/bin/sh\nexec '{}' sweep\n", exe.display());
    if write_if_changed(&script_path, script.as_bytes())? {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))?;
        }
    }

    let Some(home) = dirs::home_dir() else {
        log::warn!("no home directory; skipping launchd agent installation");
        return Ok(());
    };
    let agents = home.join("Library/LaunchAgents");
    std::fs::create_dir_all(&agents)?;

    let plist_path = agents.join(format!("{}.plist", defaults::LAUNCHD_LABEL));
    let plist = launchd_plist(&script_path);

    if write_if_changed(&plist_path, plist.as_bytes())? {
        let plist_arg = plist_path.display().to_string();
        let _ = Command::new("launchctl")
            .args(["unload", plist_arg.as_str()])
            .status();
        match Command::new("launchctl")
            .args(["load", plist_arg.as_str()])
            .status()
        {
            Ok(status) if status.success() => {
                log::info!("maintenance agent loaded: {}", defaults::LAUNCHD_LABEL)
            }
            Ok(status) => log::warn!("launchctl load exited with {}", status),
            Err(err) => log::warn!("launchctl load failed: {}", err),
        }
    }

    Ok(())
}

fn launchd_plist(script: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>/bin/sh</string>
        <string>{script}</string>
    </array>
    <key>StartInterval</key>
    <integer>{interval}</integer>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
        label = defaults::LAUNCHD_LABEL,
        script = script.display(),
        interval = defaults::SWEEP_INTERVAL_SECS,
    )
}

/// Write `content` to `path` unless it is already there. Returns whether
/// anything was written.
fn write_if_changed(path: &Path, content: &[u8]) -> io::Result<bool> {
    if std::fs::read(path).map(|existing| existing == content).unwrap_or(false) {
        return Ok(false);
    }
    std::fs::write(path, content)?;
    Ok(true)
}
