//! Retry policy for failed dispatches.

use std::time::Duration;

/// Backoff after a rate-limited failure.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
/// Backoff after any other failure.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Longest error text kept in a digest event.
pub const ERROR_EVENT_CHARS: usize = 200;

/// Fixed two-tier backoff keyed on a rate-limit indicator in the error text.
pub fn backoff_for(error_text: &str) -> Duration {
    if error_text.to_lowercase().contains("limit") {
        RATE_LIMIT_BACKOFF
    } else {
        ERROR_BACKOFF
    }
}

/// Keep at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_errors_back_off_longer() {
        assert_eq!(backoff_for("Rate limit exceeded"), RATE_LIMIT_BACKOFF);
        assert_eq!(backoff_for("agent rate limited (HTTP 429)"), RATE_LIMIT_BACKOFF);
        assert_eq!(backoff_for("connection reset"), ERROR_BACKOFF);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 0), "");
    }
}
