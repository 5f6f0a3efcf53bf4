//! Notification dispatch trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resilience::RemoteCallError;
use serde::{Deserialize, Serialize};

pub const APPLICATION_SUBMITTED_KIND: &str = "APPLICATION_SUBMITTED";
pub const APPLICATION_SUBMITTED_MESSAGE: &str = "Your application has been submitted successfully!";

/// A message delivered to a user through the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    /// Confirmation sent to an applicant once their application is in.
    pub fn application_submitted(user_id: i64) -> Self {
        Self {
            user_id,
            message: APPLICATION_SUBMITTED_MESSAGE.to_string(),
            kind: APPLICATION_SUBMITTED_KIND.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, event: NotificationEvent) -> Result<(), RemoteCallError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<NotificationEvent>,
    unavailable: bool,
    calls: u32,
}

/// Records dispatched notifications instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    /// Returns every notification accepted so far, oldest first.
    pub fn sent(&self) -> Vec<NotificationEvent> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    pub fn call_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn send(&self, event: NotificationEvent) -> Result<(), RemoteCallError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.calls += 1;

        if state.unavailable {
            return Err(RemoteCallError::Unavailable(
                "notification-service connection refused".to_string(),
            ));
        }

        state.sent.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = NotificationEvent::application_submitted(7);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["userId"], 7);
        assert_eq!(json["type"], "APPLICATION_SUBMITTED");
        assert_eq!(
            json["message"],
            "Your application has been submitted successfully!"
        );
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unavailable_dispatcher_records_nothing() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        dispatcher.set_unavailable(true);

        assert!(
            dispatcher
                .send(NotificationEvent::application_submitted(7))
                .await
                .is_err()
        );
        assert!(dispatcher.sent().is_empty());
        assert_eq!(dispatcher.call_count(), 1);
    }
}
