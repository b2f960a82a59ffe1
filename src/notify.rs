//! Best-effort notification delivery.
//!
//! Messages are dispatched through a disposable Apprise container. Delivery
//! is optional infrastructure: an unset destination list is a silent no-op
//! and delivery failures never surface to the caller.

use std::process::Command;

use crate::defaults;

/// Sends a notification to the configured destinations.
///
/// The title defaults to `$JOB`, then the literal fallback title. The
/// destination list defaults to `$NOTIFY`, a comma-separated set of Apprise
/// URLs. With no usable destinations this returns without doing anything.
pub fn notify(message: &str, title: Option<&str>, urls: Option<&str>) {
    let title = match title {
        Some(t) => t.to_string(),
        None => std::env::var("JOB")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::FALLBACK_TITLE.to_string()),
    };

    let raw = match urls {
        Some(u) => u.to_string(),
        None => std::env::var("NOTIFY").unwrap_or_default(),
    };

    let destinations = parse_destinations(&raw);
    if destinations.is_empty() {
        return;
    }

    let status = Command::new("docker")
        .args(["run", "--rm", defaults::APPRISE_IMAGE, "apprise"])
        .args(["-t", title.as_str(), "-b", message])
        .args(&destinations)
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("notification delivery exited with {}", status),
        Err(err) => log::warn!("notification delivery failed: {}", err),
    }
}

/// Splits a comma-separated destination list, trimming whitespace and
/// dropping empty entries.
pub fn parse_destinations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destinations_trims_and_drops_empties() {
        let parsed = parse_destinations(" http://a , ,http://b ");
        assert_eq!(parsed, vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_parse_destinations_empty_input() {
        assert!(parse_destinations("").is_empty());
        assert!(parse_destinations("  ,  , ").is_empty());
    }

    #[test]
    fn test_parse_destinations_single() {
        assert_eq!(parse_destinations("mailto://x"), vec!["mailto://x"]);
    }

    #[test]
    fn test_notify_without_destinations_is_a_no_op() {
        // An explicitly empty destination list returns before any
        // delivery attempt is made.
        notify("message", Some("title"), Some(""));
        notify("message", Some("title"), Some(" , ,"));
    }
}
