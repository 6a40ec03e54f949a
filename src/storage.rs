//! Durable storage for tasks and dependency edges.
//!
//! [`GraphStore`] is the record of current truth: it enforces referential
//! integrity and edge uniqueness but makes no policy decisions. [`Storage`]
//! is the SQLite-backed implementation.

use crate::error::{Result, StoreError};
use crate::types::{DependencyEdge, Task, TaskFields, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Storage directory name.
pub const STORE_DIR: &str = ".taskgraph";

/// SQLite database file.
pub const DB_FILE: &str = "taskgraph.db";

const TASK_COLUMNS: &str = "id, title, description, priority, status, due_at, created_at";

/// Node and edge records.
///
/// Reads take `&self`, writes take `&mut self`; callers serialize writes.
pub trait GraphStore {
    /// Fetch a task, failing with `TaskNotFound` if absent.
    fn get_task(&self, id: TaskId) -> Result<Task>;

    fn task_exists(&self, id: TaskId) -> Result<bool>;

    /// Insert a new task when `id` is `None`, otherwise replace every field of
    /// the existing task (keeping its creation time).
    fn save_task(&mut self, id: Option<TaskId>, fields: &TaskFields) -> Result<Task>;

    /// Delete a task and every edge touching it. Returns the number of edges removed.
    fn delete_task(&mut self, id: TaskId) -> Result<usize>;

    /// Record `task_id -> depends_on_id`.
    ///
    /// Fails with `TaskNotFound` if either endpoint is missing and with
    /// `DuplicateDependency` if the edge is already present.
    fn add_edge(&mut self, task_id: TaskId, depends_on_id: TaskId) -> Result<DependencyEdge>;

    fn edge_exists(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<bool>;

    /// Direct dependencies of `id`.
    fn edges_from(&self, id: TaskId) -> Result<BTreeSet<TaskId>>;

    /// One window of tasks ordered by id, plus the total matching `status`.
    fn list_tasks(&self, status: Option<TaskStatus>, offset: u64, limit: u32) -> Result<(Vec<Task>, u64)>;

    /// Every task whose status differs from `status`, ordered by id.
    fn tasks_excluding_status(&self, status: TaskStatus) -> Result<Vec<Task>>;
}

/// SQLite-backed [`GraphStore`].
pub struct Storage {
    db: Mutex<Connection>,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        fs::create_dir_all(&store_dir)?;

        let db = Connection::open(store_dir.join(DB_FILE))?;
        let storage = Self { db: Mutex::new(db) };
        storage.init_schema()?;

        log::info!("Initialized task store in {}", store_dir.display());
        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let db_path = root.join(STORE_DIR).join(DB_FILE);
        if !db_path.exists() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no task store found in {}; run 'tg init' first", root.display()),
            )));
        }

        let db = Connection::open(&db_path)?;
        let storage = Self { db: Mutex::new(db) };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high')),
                status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed')),
                due_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

            CREATE TABLE IF NOT EXISTS dependencies (
                task_id INTEGER NOT NULL REFERENCES tasks(id),
                depends_on_id INTEGER NOT NULL REFERENCES tasks(id),
                created_at TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on_id),
                CHECK (task_id != depends_on_id)
            );
            CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on ON dependencies(depends_on_id);
        "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned("storage"))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.db.get_mut().map_err(|_| StoreError::LockPoisoned("storage"))
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Convert a database row to a Task.
    fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
        let priority: String = row.get(3)?;
        let status: String = row.get(4)?;
        let due_at: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;

        Ok(Task {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            priority: parse_column(3, &priority)?,
            status: parse_column(4, &status)?,
            due_at: due_at.map(|s| parse_timestamp(5, &s)).transpose()?,
            created_at: parse_timestamp(6, &created_at)?,
        })
    }
}

impl GraphStore for Storage {
    fn get_task(&self, id: TaskId) -> Result<Task> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;

        stmt.query_row(params![id], Self::row_to_task)
            .optional()?
            .ok_or(StoreError::TaskNotFound(id))
    }

    fn task_exists(&self, id: TaskId) -> Result<bool> {
        let found = self
            .conn()?
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn save_task(&mut self, id: Option<TaskId>, fields: &TaskFields) -> Result<Task> {
        let due_at = fields.due_at.map(|dt| dt.to_rfc3339());

        let id = match id {
            None => {
                let conn = self.conn_mut()?;
                conn.execute(
                    r#"
                    INSERT INTO tasks (title, description, priority, status, due_at, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        fields.title,
                        fields.description,
                        fields.priority.as_str(),
                        fields.status.as_str(),
                        due_at,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                conn.last_insert_rowid()
            }
            Some(id) => {
                let updated = self.conn_mut()?.execute(
                    r#"
                    UPDATE tasks
                    SET title = ?1, description = ?2, priority = ?3, status = ?4, due_at = ?5
                    WHERE id = ?6
                    "#,
                    params![
                        fields.title,
                        fields.description,
                        fields.priority.as_str(),
                        fields.status.as_str(),
                        due_at,
                        id,
                    ],
                )?;
                if updated == 0 {
                    return Err(StoreError::TaskNotFound(id));
                }
                id
            }
        };

        self.get_task(id)
    }

    fn delete_task(&mut self, id: TaskId) -> Result<usize> {
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;

        let edges_removed = tx.execute(
            "DELETE FROM dependencies WHERE task_id = ?1 OR depends_on_id = ?1",
            params![id],
        )?;
        let tasks_removed = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if tasks_removed == 0 {
            // Dropping the transaction rolls it back
            return Err(StoreError::TaskNotFound(id));
        }

        tx.commit()?;
        Ok(edges_removed)
    }

    fn add_edge(&mut self, task_id: TaskId, depends_on_id: TaskId) -> Result<DependencyEdge> {
        for id in [task_id, depends_on_id] {
            if !self.task_exists(id)? {
                return Err(StoreError::TaskNotFound(id));
            }
        }
        if self.edge_exists(task_id, depends_on_id)? {
            return Err(StoreError::DuplicateDependency { task_id, depends_on_id });
        }

        let edge = DependencyEdge {
            task_id,
            depends_on_id,
            created_at: Utc::now(),
        };

        self.conn_mut()?.execute(
            "INSERT INTO dependencies (task_id, depends_on_id, created_at) VALUES (?1, ?2, ?3)",
            params![edge.task_id, edge.depends_on_id, edge.created_at.to_rfc3339()],
        )?;

        Ok(edge)
    }

    fn edge_exists(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM dependencies WHERE task_id = ?1 AND depends_on_id = ?2",
                params![task_id, depends_on_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn edges_from(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT depends_on_id FROM dependencies WHERE task_id = ?1")?;
        let targets = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<TaskId>>>()?;
        Ok(targets)
    }

    fn list_tasks(&self, status: Option<TaskStatus>, offset: u64, limit: u32) -> Result<(Vec<Task>, u64)> {
        let status = status.map(|s| s.as_str());
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE (?1 IS NULL OR status = ?1)",
            params![status],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC LIMIT ?2 OFFSET ?3"
        ))?;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let tasks = stmt
            .query_map(params![status, i64::from(limit), offset], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;

        Ok((tasks, total as u64))
    }

    fn tasks_excluding_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status != ?1 ORDER BY id ASC"
        ))?;
        let tasks = stmt
            .query_map(params![status.as_str()], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;
        Ok(tasks)
    }
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
