//! Job application aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

/// Review status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Reviewing,
    Shortlisted,
    Interviewed,
    Offered,
    Accepted,
    Rejected,
    Withdrawn,
}

/// Input for submitting an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub applicant_id: i64,
    pub applicant_email: String,
    pub job_id: i64,
    #[serde(default)]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

/// A persisted application for a job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: AggregateId,
    pub applicant_id: i64,
    pub applicant_email: String,
    pub job_id: i64,
    pub resume_url: Option<String>,
    pub cover_letter: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
}

impl Application {
    /// Creates a pending application with a fresh ID.
    pub fn submit(new: NewApplication) -> Self {
        Self {
            id: AggregateId::new(),
            applicant_id: new.applicant_id,
            applicant_email: new.applicant_email,
            job_id: new.job_id,
            resume_url: new.resume_url,
            cover_letter: new.cover_letter,
            status: ApplicationStatus::Pending,
            applied_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_starts_pending() {
        let application = Application::submit(NewApplication {
            applicant_id: 7,
            applicant_email: "alice@example.com".to_string(),
            job_id: 3,
            resume_url: None,
            cover_letter: Some("Hello".to_string()),
        });

        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.applicant_id, 7);
        assert!(!application.id.as_str().is_empty());
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let new: NewApplication = serde_json::from_str(
            r#"{"applicant_id": 7, "applicant_email": "a@b.c", "job_id": 3}"#,
        )
        .unwrap();
        assert_eq!(new.resume_url, None);
        assert_eq!(new.cover_letter, None);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&ApplicationStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}
