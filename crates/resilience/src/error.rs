//! Errors returned by remote dependencies.

use std::time::Duration;

use thiserror::Error;

/// Outcome of a failed call to a remote dependency.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    /// The dependency did not answer within the guard's call timeout.
    #[error("{dependency} did not answer within {after:?}")]
    Timeout { dependency: String, after: Duration },

    /// The dependency could not be reached or answered with a server error.
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    /// The dependency answered and refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The dependency answered that the requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteCallError {
    /// Returns true for failures worth retrying and counting against the
    /// breaker. Business answers (`Rejected`, `NotFound`) are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteCallError::Timeout { .. } | RemoteCallError::Unavailable(_)
        )
    }
}
