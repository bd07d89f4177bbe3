/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stdout is a TTY, plain text otherwise.
pub fn actorcache_prefix() -> &'static str {
    if std::io::stdout().is_terminal() {
        "\x1b[96m[actorcache]\x1b[0m"
    } else {
        "[actorcache]"
    }
}

/// Shorten a fingerprint for display
pub fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
