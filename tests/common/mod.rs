//! Shared test infrastructure for taskgraph integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use taskgraph::{
    DependencyEdge, GraphStore, Result, Storage, Store, Task, TaskFields, TaskId, TaskStatus,
};
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Create a task with default fields.
    pub fn create_task(&self, title: &str) -> Task {
        self.store
            .create_task(TaskFields::new(title))
            .expect("Failed to create task")
    }

    /// Create a task with the given status.
    pub fn create_task_with_status(&self, title: &str, status: TaskStatus) -> Task {
        self.store
            .create_task(TaskFields::new(title).with_status(status))
            .expect("Failed to create task")
    }

    /// Add a dependency (from depends on to).
    pub fn depend(&self, from: &Task, to: &Task) -> DependencyEdge {
        self.store
            .add_dependency(from.id, to.id)
            .expect("Failed to add dependency")
    }

    /// Transitive dependencies of a task.
    pub fn deps(&self, task: &Task) -> BTreeSet<TaskId> {
        self.store.dependencies(task.id).expect("Failed to get dependencies")
    }

    /// Open a second handle on the same database to inspect committed state.
    pub fn raw_storage(&self) -> Storage {
        Storage::open(self.temp_dir.path()).expect("Failed to open storage")
    }

    /// Whether the edge `from -> to` is committed.
    pub fn has_edge(&self, from: &Task, to: &Task) -> bool {
        self.raw_storage()
            .edge_exists(from.id, to.id)
            .expect("Failed to check edge")
    }

    /// Number of committed edges.
    pub fn edge_count(&self) -> u64 {
        self.raw_storage().edge_count().expect("Failed to count edges")
    }

    /// Total tasks across all pages.
    pub fn total_count(&self) -> u64 {
        self.store.list_tasks(0, 10, None).expect("Failed to list tasks").total
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an id set from a slice of tasks.
pub fn ids(tasks: &[&Task]) -> BTreeSet<TaskId> {
    tasks.iter().map(|t| t.id).collect()
}

/// A [`GraphStore`] that counts every call before delegating to SQLite.
pub struct CountingStore {
    inner: Storage,
    calls: Arc<AtomicUsize>,
}

impl CountingStore {
    /// Create a counting store over a fresh database; returns the shared call counter.
    pub fn init(temp_dir: &TempDir) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Self {
            inner: Storage::init(temp_dir.path()).expect("Failed to init storage"),
            calls: Arc::clone(&calls),
        };
        (store, calls)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl GraphStore for CountingStore {
    fn get_task(&self, id: TaskId) -> Result<Task> {
        self.touch();
        self.inner.get_task(id)
    }

    fn task_exists(&self, id: TaskId) -> Result<bool> {
        self.touch();
        self.inner.task_exists(id)
    }

    fn save_task(&mut self, id: Option<TaskId>, fields: &TaskFields) -> Result<Task> {
        self.touch();
        self.inner.save_task(id, fields)
    }

    fn delete_task(&mut self, id: TaskId) -> Result<usize> {
        self.touch();
        self.inner.delete_task(id)
    }

    fn add_edge(&mut self, task_id: TaskId, depends_on_id: TaskId) -> Result<DependencyEdge> {
        self.touch();
        self.inner.add_edge(task_id, depends_on_id)
    }

    fn edge_exists(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<bool> {
        self.touch();
        self.inner.edge_exists(task_id, depends_on_id)
    }

    fn edges_from(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        self.touch();
        self.inner.edges_from(id)
    }

    fn list_tasks(&self, status: Option<TaskStatus>, offset: u64, limit: u32) -> Result<(Vec<Task>, u64)> {
        self.touch();
        self.inner.list_tasks(status, offset, limit)
    }

    fn tasks_excluding_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.touch();
        self.inner.tasks_excluding_status(status)
    }
}
