use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(DomainError::validation(format!("invalid status `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// Applies the present fields of `update`; `updated_at` is always bumped.
    pub fn apply(&mut self, update: TaskUpdate, now: OffsetDateTime) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
}

/// A validated create request, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_date: OffsetDateTime,
}

impl TaskCreate {
    pub fn validate(self, now: OffsetDateTime) -> Result<NewTask, DomainError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        let due_date = self
            .due_date
            .ok_or_else(|| DomainError::validation("due date is required"))?;
        if due_date < now {
            return Err(DomainError::validation("due date must be in the future"));
        }

        Ok(NewTask {
            title: title.to_string(),
            description: self.description,
            status: self.status.unwrap_or_default(),
            due_date,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
}

impl TaskUpdate {
    pub fn validate(&self, now: OffsetDateTime) -> Result<(), DomainError> {
        if let Some(title) = self.title.as_deref()
            && title.trim().is_empty()
        {
            return Err(DomainError::validation("title must not be empty"));
        }
        if let Some(due_date) = self.due_date
            && due_date < now
        {
            return Err(DomainError::validation("due date must be in the future"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    fn create(title: &str, due_in: Option<Duration>) -> TaskCreate {
        TaskCreate {
            title: title.to_string(),
            description: String::new(),
            status: None,
            due_date: due_in.map(|offset| NOW + offset),
        }
    }

    #[test]
    fn create_defaults_status_to_pending() {
        let task = create("write report", Some(Duration::days(1)))
            .validate(NOW)
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.title, "write report");
    }

    #[test]
    fn create_requires_title() {
        let err = create("   ", Some(Duration::days(1))).validate(NOW).unwrap_err();
        assert!(err.to_string().contains("title is required"));
    }

    #[test]
    fn create_requires_future_due_date() {
        assert!(create("a", None).validate(NOW).is_err());
        let err = create("a", Some(Duration::hours(-1))).validate(NOW).unwrap_err();
        assert!(err.to_string().contains("future"));
    }

    #[test]
    fn update_rejects_past_due_date() {
        let update = TaskUpdate {
            due_date: Some(NOW - Duration::days(2)),
            ..Default::default()
        };
        assert!(update.validate(NOW).is_err());
        assert!(TaskUpdate::default().validate(NOW).is_ok());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn create_payload_parses_rfc3339() {
        let payload: TaskCreate = serde_json::from_str(
            r#"{"title":"ship","status":"in_progress","due_date":"2026-04-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(payload.status, Some(TaskStatus::InProgress));
        assert_eq!(payload.due_date, Some(datetime!(2026-04-01 09:00 UTC)));
    }

    #[test]
    fn apply_overwrites_present_fields_only() {
        let mut task = Task {
            id: Uuid::nil(),
            title: "old".to_string(),
            description: "keep".to_string(),
            status: TaskStatus::Pending,
            due_date: NOW + Duration::days(1),
            created_at: NOW,
            updated_at: NOW,
        };
        let later = NOW + Duration::minutes(5);
        task.apply(
            TaskUpdate {
                title: Some("new".to_string()),
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
            later,
        );
        assert_eq!(task.title, "new");
        assert_eq!(task.description, "keep");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.updated_at, later);
    }
}
