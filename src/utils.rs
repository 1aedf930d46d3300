//! Utility functions shared across the codebase

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Get current time in milliseconds since Unix epoch
/// Returns 0 if system time is before Unix epoch (fallback behavior)
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_millis(0))
        .as_millis() as u64
}

/// Milliseconds elapsed since `since`
pub fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Make `name` usable as a single path component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, and a leading dot is
/// replaced so the result is never hidden or `..`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("passpoint-blue"), "passpoint-blue");
        assert_eq!(sanitize_file_name("a b/c"), "a_b_c");
        assert_eq!(sanitize_file_name(".."), "_.");
        assert_eq!(sanitize_file_name(""), "_");
        assert_eq!(sanitize_file_name("caf\u{e9}"), "caf_");
    }

    #[test]
    fn test_now_ms_is_recent() {
        // 2020-01-01
        assert!(now_ms() > 1_577_836_800_000);
    }
}
