//! Request/response types for the JSON-lines request layer.

use crate::error::{ErrorKind, StoreError};
use crate::types::{DependencyEdge, Task, TaskFields, TaskId, TaskPage, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_page_size() -> u32 {
    10
}

/// Request sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a new task.
    CreateTask { fields: TaskFields },

    /// List one page of tasks.
    ListTasks {
        #[serde(default)]
        page: u32,
        #[serde(default = "default_page_size")]
        page_size: u32,
        #[serde(default)]
        status: Option<TaskStatus>,
    },

    /// Get a task by ID.
    GetTask { id: TaskId },

    /// Replace every field of a task.
    UpdateTask { id: TaskId, fields: TaskFields },

    /// Delete a task and its edges.
    DeleteTask { id: TaskId },

    /// Record that `task_id` depends on `depends_on_id`.
    AddDependency { task_id: TaskId, depends_on_id: TaskId },

    /// Get the transitive dependencies of a task.
    GetDependencies { id: TaskId },

    /// Stop accepting requests.
    Shutdown,

    /// Ping to check the server is alive.
    Ping,
}

/// Response sent back for each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Task { task: Task },

    Page { page: TaskPage },

    Edge { edge: DependencyEdge },

    Dependencies { ids: BTreeSet<TaskId> },

    /// Operation succeeded.
    Ok,

    Pong,

    /// The request failed.
    Error {
        status: u16,
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    /// Create an error response for a malformed request line.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Error {
            status: ErrorKind::InvalidInput.status_code(),
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        }
    }
}

impl From<StoreError> for Response {
    fn from(err: StoreError) -> Self {
        let kind = err.kind();
        // Internal details stay in the log
        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };
        Self::Error {
            status: kind.status_code(),
            kind,
            message,
        }
    }
}
