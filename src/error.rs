//! Error types for task graph operations.

use crate::types::{TaskId, ValidationError};
use serde::{Deserialize, Serialize};

/// Result alias used throughout the library.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur during store operations.
///
/// The first four variants are expected domain outcomes. Everything else is
/// an internal failure and is reported as [`ErrorKind::Internal`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The exact same dependency already exists.
    #[error("dependency already exists: {task_id} -> {depends_on_id}")]
    DuplicateDependency { task_id: TaskId, depends_on_id: TaskId },

    /// Adding this dependency would close a cycle.
    #[error("circular dependency detected: {task_id} -> {depends_on_id}")]
    CyclicDependency { task_id: TaskId, depends_on_id: TaskId },

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Caller-facing classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    CyclicDependency,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status for the boundary layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::CyclicDependency | ErrorKind::InvalidInput => 400,
            ErrorKind::Internal => 500,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::TaskNotFound(_) => ErrorKind::NotFound,
            StoreError::DuplicateDependency { .. } => ErrorKind::Conflict,
            StoreError::CyclicDependency { .. } => ErrorKind::CyclicDependency,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Database(_) | StoreError::Io(_) | StoreError::LockPoisoned(_) => ErrorKind::Internal,
        }
    }

    /// True for the four expected domain outcomes.
    pub fn is_domain(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }
}
