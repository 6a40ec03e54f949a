//! Core data types for the task graph.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque task identifier, assigned by the store on creation.
pub type TaskId = i64;

/// Longest accepted title, in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Largest page size a listing may request.
pub const MAX_PAGE_SIZE: u32 = 1_000;

/// A node in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,

    /// Short description of the work
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub priority: Priority,

    pub status: TaskStatus,

    /// When the task is due (if ever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Due in the past and not yet completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.due_at.is_some_and(|due| due < now)
    }

    /// Due strictly inside `(now, now + window)` and not yet completed.
    ///
    /// A window reaching past the representable range has no upper bound.
    pub fn is_upcoming(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.status == TaskStatus::Completed {
            return false;
        }
        let end = now.checked_add_signed(window);
        self.due_at
            .is_some_and(|due| due > now && end.is_none_or(|end| due < end))
    }
}

/// The caller-supplied fields of a task.
///
/// Used for both creation and update; an update replaces every field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFields {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskFields {
    /// Fields with just a title and every other field defaulted.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::default(),
            status: TaskStatus::default(),
            due_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Validate the fields before they reach storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // Title: required, 1-500 chars, no control characters
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self.title.chars().any(char::is_control) {
            return Err(ValidationError::InvalidCharacters);
        }

        if let Some(description) = &self.description
            && description.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(ValidationError::DescriptionTooLong);
        }

        Ok(())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}': expected low, medium or high", other)),
        }
    }
}

/// Task status states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "unknown status '{}': expected pending, in_progress or completed",
                other
            )),
        }
    }
}

/// A directed dependency: `task_id` depends on `depends_on_id`.
///
/// Edges are immutable once created and only disappear when one of their
/// endpoints is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEdge {
    pub task_id: TaskId,

    pub depends_on_id: TaskId,

    pub created_at: DateTime<Utc>,
}

/// One page of a task listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,

    /// Zero-based page index
    pub page: u32,

    pub page_size: u32,

    /// Number of tasks matching the filter across all pages
    pub total: u64,
}

/// Validation errors for caller input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("title exceeds {} characters", MAX_TITLE_LEN)]
    TitleTooLong,
    #[error("title contains control characters")]
    InvalidCharacters,
    #[error("description exceeds {} characters", MAX_DESCRIPTION_LEN)]
    DescriptionTooLong,
    #[error("page size must be between 1 and {}", MAX_PAGE_SIZE)]
    InvalidPageSize,
}

/// Check a listing's page size.
pub fn validate_page_size(page_size: u32) -> Result<(), ValidationError> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize);
    }
    Ok(())
}
