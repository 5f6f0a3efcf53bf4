//! Remote call guard: per-dependency circuit breakers, bounded retries and
//! an explicit fallback for every guarded call.
//!
//! The guard never hands a remote failure back to its caller. When the
//! circuit is open or every attempt failed, the caller-supplied fallback
//! runs instead and its value is returned.

pub mod breaker;
pub mod error;
pub mod guard;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerSnapshot, CallPermit, CircuitBreaker, CircuitState};
pub use error::RemoteCallError;
pub use guard::{FallbackCause, GuardConfig, RemoteCallGuard};
pub use registry::BreakerRegistry;
pub use retry::RetryPolicy;
