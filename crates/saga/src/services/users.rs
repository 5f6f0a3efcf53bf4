//! User directory client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use resilience::RemoteCallError;
use serde::{Deserialize, Serialize};

/// A user as reported by the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub active: bool,
}

/// Lookup of users held by the user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetches a user by ID.
    async fn fetch_user(&self, user_id: i64) -> Result<UserRecord, RemoteCallError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<i64, UserRecord>,
    unavailable: bool,
    latency: Option<Duration>,
    calls: u32,
}

/// In-memory user directory with failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a user.
    pub fn insert(&self, user: UserRecord) {
        self.write().users.insert(user.id, user);
    }

    /// Makes every subsequent call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Delays every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.write().latency = latency;
    }

    /// Returns how many times `fetch_user` was invoked.
    pub fn call_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryUserState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn fetch_user(&self, user_id: i64) -> Result<UserRecord, RemoteCallError> {
        let (latency, result) = {
            let mut state = self.write();
            state.calls += 1;
            let result = if state.unavailable {
                Err(RemoteCallError::Unavailable(
                    "user-service connection refused".to_string(),
                ))
            } else {
                state
                    .users
                    .get(&user_id)
                    .cloned()
                    .ok_or_else(|| RemoteCallError::NotFound(format!("user {user_id}")))
            };
            (state.latency, result)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRecord {
        UserRecord {
            id: 7,
            email: "alice@example.com".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_fetch_known_user() {
        let users = InMemoryUserDirectory::new();
        users.insert(alice());

        assert_eq!(users.fetch_user(7).await, Ok(alice()));
        assert_eq!(users.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let users = InMemoryUserDirectory::new();
        let err = users.fetch_user(99).await.unwrap_err();
        assert_eq!(err, RemoteCallError::NotFound("user 99".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_is_transient() {
        let users = InMemoryUserDirectory::new();
        users.insert(alice());
        users.set_unavailable(true);

        let err = users.fetch_user(7).await.unwrap_err();
        assert!(err.is_transient());

        users.set_unavailable(false);
        assert!(users.fetch_user(7).await.is_ok());
        assert_eq!(users.call_count(), 2);
    }
}
