//! Bounded immediate retries for transient remote failures.

use std::time::Duration;

use crate::RemoteCallError;

/// How many times a guarded call is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// `max_attempts` attempts separated by a fixed `backoff`.
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Total attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns true if another attempt should follow `attempt` (1-based)
    /// that failed with `error`.
    pub fn should_retry(&self, attempt: u32, error: &RemoteCallError) -> bool {
        error.is_transient() && attempt < self.attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(100))
    }
}
