//! Remote dependencies called by the application saga, with in-memory
//! implementations for tests and the demo server.

pub mod jobs;
pub mod notifications;
pub mod users;

pub use jobs::{InMemoryJobCatalog, JobCatalog, JobRecord};
pub use notifications::{
    APPLICATION_SUBMITTED_KIND, APPLICATION_SUBMITTED_MESSAGE, InMemoryNotificationDispatcher,
    NotificationDispatcher, NotificationEvent,
};
pub use users::{InMemoryUserDirectory, UserDirectory, UserRecord};
