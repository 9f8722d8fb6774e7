//! Retry policy for the LLM boundary.
//!
//! Only rate-limit errors are retried, with a fixed delay between attempts —
//! the upstream quota resets on a clock, so exponential backoff buys nothing
//! here. Any other error fails on the first attempt.

use std::time::Duration;

/// Configuration for LLM call retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per call, first try included. 1 = no retries.
    pub max_attempts: u32,
    /// Fixed delay between rate-limited attempts.
    pub rate_limit_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_delay: Duration::from_secs_f64(2.0),
        }
    }
}

impl RetryConfig {
    /// Create a config with the given attempt count. Uses the default delay.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Override the delay between rate-limited attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }
}

/// Substrings that classify an error as a rate limit (matched lowercased).
const RATE_LIMIT_SIGNATURES: &[&str] = &[
    "429",
    "resource has been exhausted",
    "exceeded your rate limit",
    "rpm",
];

/// Whether an error string carries the rate-limit signature.
pub fn is_rate_limit_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|s| lower.contains(s))
}
