use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Retries allowed for the stream-opening POST, after the initial attempt.
/// Applies only before the first byte of the stream; an open stream is
/// never silently reconnected here.
pub const MAX_OPEN_RETRIES: u32 = 2;
/// Delay before the first retry; doubles per attempt up to
/// [`MAX_OPEN_DELAY`].
pub const BASE_OPEN_DELAY: Duration = Duration::from_secs(1);
/// Ceiling on the per-attempt delay.
pub const MAX_OPEN_DELAY: Duration = Duration::from_secs(8);

/// Body phrases that mark an otherwise opaque failure as transient.
const TRANSIENT_PHRASES: [&str; 5] = [
    "rate.?limit",
    "overloaded",
    "service.?unavailable",
    "upstream.?connect",
    "connection.?refused",
];

fn transient_phrase_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        let pattern = format!("(?i){}", TRANSIENT_PHRASES.join("|"));
        Regex::new(&pattern).expect("transient phrase pattern must compile")
    })
}

/// Transient-failure classification for stream-open responses.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
        || transient_phrase_regex().is_match(error_text)
}

/// Doubling backoff for an open-retry attempt, capped at
/// [`MAX_OPEN_DELAY`].
pub fn open_retry_delay(attempt: u32) -> Duration {
    BASE_OPEN_DELAY
        .saturating_mul(1u32 << attempt.min(4))
        .min(MAX_OPEN_DELAY)
}
