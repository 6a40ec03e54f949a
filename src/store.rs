//! High-level store API: validated mutations and cached reads.
//!
//! Every mutation holds the graph write lock from validation through commit
//! and cache invalidation, so concurrent `add_dependency` calls cannot both
//! pass the cycle check against the same snapshot. Cache misses are computed
//! and written back under the graph read lock, so an invalidation can never
//! be followed by a stale write of the value it evicted.

use crate::cache::{ListingKey, ResultCache};
use crate::error::{Result, StoreError};
use crate::graph::{transitive_dependencies, would_create_cycle};
use crate::storage::{GraphStore, Storage};
use crate::types::{DependencyEdge, Task, TaskFields, TaskId, TaskPage, TaskStatus, validate_page_size};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The task graph with its result cache.
pub struct Store<S = Storage> {
    graph: RwLock<S>,
    cache: ResultCache,
}

impl Store<Storage> {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        Ok(Self::with_storage(Storage::init(root)?))
    }

    /// Open an existing store. The cache starts cold.
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self::with_storage(Storage::open(root)?))
    }
}

impl<S: GraphStore> Store<S> {
    /// Wrap a graph store with an empty cache.
    pub fn with_storage(storage: S) -> Self {
        Self {
            graph: RwLock::new(storage),
            cache: ResultCache::new(),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn read_graph(&self) -> Result<RwLockReadGuard<'_, S>> {
        self.graph.read().map_err(|_| StoreError::LockPoisoned("graph"))
    }

    fn write_graph(&self) -> Result<RwLockWriteGuard<'_, S>> {
        self.graph.write().map_err(|_| StoreError::LockPoisoned("graph"))
    }

    /// Create a new task.
    pub fn create_task(&self, fields: TaskFields) -> Result<Task> {
        fields.validate()?;

        let mut graph = self.write_graph()?;
        let task = graph.save_task(None, &fields)?;
        let cleared = self.cache.clear_listings();

        log::info!(
            "Created task {} '{}'; cleared {} cached listing page(s)",
            task.id,
            task.title,
            cleared
        );
        Ok(task)
    }

    /// Get a task by ID. Not cached.
    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.read_graph()?.get_task(id)
    }

    /// One page of tasks ordered by id, optionally filtered by status.
    pub fn list_tasks(&self, page: u32, page_size: u32, status: Option<TaskStatus>) -> Result<TaskPage> {
        validate_page_size(page_size)?;

        let key = ListingKey {
            page,
            page_size,
            status,
        };
        if let Some(cached) = self.cache.get_listing(&key) {
            log::debug!("Listing cache hit: {:?}", key);
            return Ok(cached);
        }

        let graph = self.read_graph()?;
        log::debug!("Listing cache miss, querying store: {:?}", key);

        let offset = u64::from(page) * u64::from(page_size);
        let (tasks, total) = graph.list_tasks(status, offset, page_size)?;
        let result = TaskPage {
            tasks,
            page,
            page_size,
            total,
        };

        self.cache.put_listing(key, result.clone());
        Ok(result)
    }

    /// Replace every field of an existing task.
    pub fn update_task(&self, id: TaskId, fields: TaskFields) -> Result<Task> {
        fields.validate()?;

        let mut graph = self.write_graph()?;
        let task = graph.save_task(Some(id), &fields)?;
        let cleared = self.cache.clear_listings();

        log::info!("Updated task {}; cleared {} cached listing page(s)", id, cleared);
        Ok(task)
    }

    /// Delete a task together with every dependency edge touching it.
    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        let mut graph = self.write_graph()?;
        let edges_removed = graph.delete_task(id)?;

        let cleared = self.cache.clear_listings();
        let evicted = self.cache.invalidate_closures_reaching(id);

        log::info!(
            "Deleted task {} and {} edge(s); cleared {} listing page(s), evicted closures {:?}",
            id,
            edges_removed,
            cleared,
            evicted
        );
        Ok(())
    }

    /// Record that `task_id` depends on `depends_on_id`.
    ///
    /// Checks run in order: both tasks exist, the edge closes no cycle, the
    /// edge is new. Listings are unaffected by edges and stay cached.
    pub fn add_dependency(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<DependencyEdge> {
        let mut graph = self.write_graph()?;

        for id in [task_id, depends_on_id] {
            if !graph.task_exists(id)? {
                return Err(StoreError::TaskNotFound(id));
            }
        }

        if would_create_cycle(&*graph, task_id, depends_on_id)? {
            log::info!("Rejected dependency {} -> {}: would create a cycle", task_id, depends_on_id);
            return Err(StoreError::CyclicDependency { task_id, depends_on_id });
        }

        if graph.edge_exists(task_id, depends_on_id)? {
            return Err(StoreError::DuplicateDependency { task_id, depends_on_id });
        }

        let edge = graph.add_edge(task_id, depends_on_id)?;
        let evicted = self.cache.invalidate_closures_reaching(task_id);

        log::info!(
            "Added dependency {} -> {}; evicted closures {:?}",
            task_id,
            depends_on_id,
            evicted
        );
        Ok(edge)
    }

    /// Every task `id` depends on, directly or transitively.
    pub fn dependencies(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        if let Some(cached) = self.cache.get_closure(id) {
            log::debug!("Closure cache hit for task {}", id);
            return Ok(cached);
        }

        let graph = self.read_graph()?;
        log::debug!("Closure cache miss for task {}, traversing graph", id);

        let closure = transitive_dependencies(&*graph, id)?;
        self.cache.put_closure(id, closure.clone());
        Ok(closure)
    }

    /// Every task not yet completed, for the notification scan. Bypasses the cache.
    pub fn all_non_completed_tasks(&self) -> Result<Vec<Task>> {
        self.read_graph()?.tasks_excluding_status(TaskStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    fn create(store: &Store, title: &str) -> Task {
        store.create_task(TaskFields::new(title)).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let (_temp_dir, store) = setup_test_store();

        let task = store
            .create_task(TaskFields::new("Test task").with_description("A description"))
            .unwrap();

        assert_eq!(task.title, "Test task");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(store.get_task(task.id).unwrap(), task);
    }

    #[test]
    fn test_create_rejects_invalid_fields() {
        let (_temp_dir, store) = setup_test_store();

        let err = store.create_task(TaskFields::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(store.list_tasks(0, 10, None).unwrap().total, 0);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let (_temp_dir, store) = setup_test_store();

        let task = create(&store, "Task");
        let err = store.add_dependency(task.id, task.id).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CyclicDependency);
    }

    #[test]
    fn test_cycle_detection() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "Task A");
        let b = create(&store, "Task B");
        let c = create(&store, "Task C");

        // A -> B -> C
        store.add_dependency(a.id, b.id).unwrap();
        store.add_dependency(b.id, c.id).unwrap();

        // C -> A would create a cycle
        let err = store.add_dependency(c.id, a.id).unwrap_err();
        assert!(matches!(err, StoreError::CyclicDependency { .. }));
        assert!(store.dependencies(c.id).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_dependency_conflicts() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "Task A");
        let b = create(&store, "Task B");

        store.add_dependency(a.id, b.id).unwrap();
        let err = store.add_dependency(a.id, b.id).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_add_dependency_missing_task() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "Task A");

        assert!(matches!(store.add_dependency(a.id, 404), Err(StoreError::TaskNotFound(404))));
        assert!(matches!(store.add_dependency(404, a.id), Err(StoreError::TaskNotFound(404))));
    }

    #[test]
    fn test_update_replaces_all_fields() {
        let (_temp_dir, store) = setup_test_store();

        let task = store
            .create_task(TaskFields::new("Original").with_description("Keep me?"))
            .unwrap();
        let updated = store
            .update_task(task.id, TaskFields::new("Updated").with_status(TaskStatus::InProgress))
            .unwrap();

        assert_eq!(updated.title, "Updated");
        assert_eq!(updated.description, None);
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.created_at, task.created_at);
    }

    #[test]
    fn test_update_missing_task() {
        let (_temp_dir, store) = setup_test_store();

        let err = store.update_task(5, TaskFields::new("Nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_listing_cache_cleared_by_task_mutations() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "A");
        store.list_tasks(0, 10, None).unwrap();
        assert_eq!(store.cache().listing_len(), 1);

        let b = create(&store, "B");
        assert_eq!(store.cache().listing_len(), 0);
        assert_eq!(store.list_tasks(0, 10, None).unwrap().total, 2);

        store.update_task(b.id, TaskFields::new("B2")).unwrap();
        assert_eq!(store.cache().listing_len(), 0);
        assert_eq!(store.list_tasks(0, 10, None).unwrap().tasks[1].title, "B2");

        store.delete_task(a.id).unwrap();
        assert_eq!(store.list_tasks(0, 10, None).unwrap().total, 1);
    }

    #[test]
    fn test_listing_cache_survives_edge_mutation() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "A");
        let b = create(&store, "B");
        store.list_tasks(0, 10, None).unwrap();

        store.add_dependency(a.id, b.id).unwrap();

        assert_eq!(store.cache().listing_len(), 1);
    }

    #[test]
    fn test_ancestor_closures_evicted_on_new_edge() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "A");
        let b = create(&store, "B");
        let c = create(&store, "C");
        let d = create(&store, "D");
        store.add_dependency(a.id, b.id).unwrap();
        store.add_dependency(b.id, c.id).unwrap();

        assert_eq!(store.dependencies(a.id).unwrap(), BTreeSet::from([b.id, c.id]));
        assert_eq!(store.dependencies(b.id).unwrap(), BTreeSet::from([c.id]));
        assert_eq!(store.dependencies(d.id).unwrap(), BTreeSet::new());

        store.add_dependency(c.id, d.id).unwrap();

        assert!(!store.cache().contains_closure(a.id));
        assert!(!store.cache().contains_closure(b.id));
        assert!(store.cache().contains_closure(d.id));
        assert_eq!(store.dependencies(a.id).unwrap(), BTreeSet::from([b.id, c.id, d.id]));
    }

    #[test]
    fn test_delete_task_evicts_closures_containing_it() {
        let (_temp_dir, store) = setup_test_store();

        let a = create(&store, "A");
        let b = create(&store, "B");
        let c = create(&store, "C");
        store.add_dependency(a.id, b.id).unwrap();
        store.add_dependency(b.id, c.id).unwrap();
        store.dependencies(a.id).unwrap();
        store.dependencies(b.id).unwrap();

        store.delete_task(b.id).unwrap();

        assert!(store.dependencies(a.id).unwrap().is_empty());
        assert!(matches!(store.dependencies(b.id), Err(StoreError::TaskNotFound(_))));
    }

    #[test]
    fn test_delete_missing_task_leaves_cache_alone() {
        let (_temp_dir, store) = setup_test_store();

        create(&store, "A");
        store.list_tasks(0, 10, None).unwrap();

        assert!(store.delete_task(999).is_err());
        assert_eq!(store.cache().listing_len(), 1);
    }

    #[test]
    fn test_all_non_completed_tasks() {
        let (_temp_dir, store) = setup_test_store();

        create(&store, "Open");
        store
            .create_task(TaskFields::new("Busy").with_status(TaskStatus::InProgress))
            .unwrap();
        store
            .create_task(TaskFields::new("Done").with_status(TaskStatus::Completed))
            .unwrap();

        let titles: Vec<String> = store
            .all_non_completed_tasks()
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Open", "Busy"]);
    }
}
