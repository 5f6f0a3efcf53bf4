//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use resilience::{BreakerConfig, GuardConfig, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL for saga runs (default: unset, in-memory)
/// - `SAGA_MAX_CONCURRENT`: concurrently executing sagas (default: `64`)
/// - `BREAKER_FAILURE_THRESHOLD`: failures that open a circuit (default: `5`)
/// - `BREAKER_WINDOW_SECS`: window the failures are counted in (default: `60`)
/// - `BREAKER_COOL_DOWN_SECS`: time an open circuit waits (default: `30`)
/// - `BREAKER_HALF_OPEN_CALLS`: trial calls when half-open (default: `1`)
/// - `REMOTE_CALL_TIMEOUT_MS`: per-attempt timeout (default: `2000`)
/// - `REMOTE_RETRY_ATTEMPTS`: attempts per guarded call (default: `3`)
/// - `REMOTE_RETRY_BACKOFF_MS`: pause between attempts (default: `100`)
/// - `SEED_PATH`: JSON file of users and jobs for the in-memory directories
///   (default: unset, directories start empty)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub max_concurrent_sagas: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_window: Duration,
    pub breaker_cool_down: Duration,
    pub breaker_half_open_calls: u32,
    pub remote_call_timeout: Duration,
    pub remote_retry_attempts: u32,
    pub remote_retry_backoff: Duration,
    pub seed_path: Option<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            max_concurrent_sagas: env_or("SAGA_MAX_CONCURRENT", defaults.max_concurrent_sagas),
            breaker_failure_threshold: env_or(
                "BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_window: Duration::from_secs(env_or("BREAKER_WINDOW_SECS", 60)),
            breaker_cool_down: Duration::from_secs(env_or("BREAKER_COOL_DOWN_SECS", 30)),
            breaker_half_open_calls: env_or(
                "BREAKER_HALF_OPEN_CALLS",
                defaults.breaker_half_open_calls,
            ),
            remote_call_timeout: Duration::from_millis(env_or("REMOTE_CALL_TIMEOUT_MS", 2000)),
            remote_retry_attempts: env_or("REMOTE_RETRY_ATTEMPTS", defaults.remote_retry_attempts),
            remote_retry_backoff: Duration::from_millis(env_or("REMOTE_RETRY_BACKOFF_MS", 100)),
            seed_path: std::env::var("SEED_PATH")
                .ok()
                .filter(|path| !path.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default breaker settings applied to every dependency.
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            rolling_window: self.breaker_window,
            cool_down: self.breaker_cool_down,
            half_open_max_calls: self.breaker_half_open_calls,
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            call_timeout: self.remote_call_timeout,
            retry: RetryPolicy::fixed(self.remote_retry_attempts, self.remote_retry_backoff),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            max_concurrent_sagas: saga::DEFAULT_MAX_CONCURRENT,
            breaker_failure_threshold: 5,
            breaker_window: Duration::from_secs(60),
            breaker_cool_down: Duration::from_secs(30),
            breaker_half_open_calls: 1,
            remote_call_timeout: Duration::from_millis(2000),
            remote_retry_attempts: 3,
            remote_retry_backoff: Duration::from_millis(100),
            seed_path: None,
        }
    }
}
