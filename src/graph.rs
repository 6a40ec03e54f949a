//! Graph traversals over a [`GraphStore`].
//!
//! Both traversals are iterative DFS with an explicit stack and a visited
//! set, so deep chains cannot overflow the call stack and every node is
//! expanded at most once.

use crate::error::{Result, StoreError};
use crate::storage::GraphStore;
use crate::types::TaskId;
use std::collections::{BTreeSet, HashSet};

/// Check whether adding `from -> to` would close a cycle.
///
/// Must be evaluated before the edge is committed. A self-loop is always a
/// cycle.
pub fn would_create_cycle<S: GraphStore + ?Sized>(store: &S, from: TaskId, to: TaskId) -> Result<bool> {
    if from == to {
        return Ok(true);
    }

    // DFS from 'to' to see if we can reach 'from'
    // If yes, adding from->to would create a cycle
    let mut visited = HashSet::new();
    let mut stack = vec![to];

    while let Some(node) = stack.pop() {
        if node == from {
            return Ok(true);
        }
        if visited.insert(node) {
            stack.extend(store.edges_from(node)?.into_iter().filter(|next| !visited.contains(next)));
        }
    }

    Ok(false)
}

/// Every task reachable from `id` by following dependency edges.
///
/// `id` itself is only included if it lies on a cycle, which the graph
/// invariant rules out; the traversal terminates regardless.
pub fn transitive_dependencies<S: GraphStore + ?Sized>(store: &S, id: TaskId) -> Result<BTreeSet<TaskId>> {
    if !store.task_exists(id)? {
        return Err(StoreError::TaskNotFound(id));
    }

    let mut reached = BTreeSet::new();
    let mut stack = vec![id];

    while let Some(node) = stack.pop() {
        for next in store.edges_from(node)? {
            if reached.insert(next) {
                stack.push(next);
            }
        }
    }

    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{DependencyEdge, Task, TaskFields, TaskStatus};
    use std::collections::BTreeMap;

    /// Adjacency-only store; ignores everything but edges and existence.
    #[derive(Default)]
    struct EdgeMap {
        edges: BTreeMap<TaskId, BTreeSet<TaskId>>,
    }

    impl EdgeMap {
        fn with_edges(pairs: &[(TaskId, TaskId)]) -> Self {
            let mut map = Self::default();
            for &(from, to) in pairs {
                map.edges.entry(from).or_default().insert(to);
                map.edges.entry(to).or_default();
            }
            map
        }
    }

    impl GraphStore for EdgeMap {
        fn get_task(&self, id: TaskId) -> Result<Task> {
            Err(StoreError::TaskNotFound(id))
        }

        fn task_exists(&self, id: TaskId) -> Result<bool> {
            Ok(self.edges.contains_key(&id))
        }

        fn save_task(&mut self, _id: Option<TaskId>, _fields: &TaskFields) -> Result<Task> {
            unimplemented!("not used by traversals")
        }

        fn delete_task(&mut self, id: TaskId) -> Result<usize> {
            Err(StoreError::TaskNotFound(id))
        }

        fn add_edge(&mut self, _task_id: TaskId, _depends_on_id: TaskId) -> Result<DependencyEdge> {
            unimplemented!("not used by traversals")
        }

        fn edge_exists(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<bool> {
            Ok(self.edges.get(&task_id).is_some_and(|e| e.contains(&depends_on_id)))
        }

        fn edges_from(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
            Ok(self.edges.get(&id).cloned().unwrap_or_default())
        }

        fn list_tasks(&self, _status: Option<TaskStatus>, _offset: u64, _limit: u32) -> Result<(Vec<Task>, u64)> {
            Ok((Vec::new(), 0))
        }

        fn tasks_excluding_status(&self, _status: TaskStatus) -> Result<Vec<Task>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let store = EdgeMap::with_edges(&[]);
        assert!(would_create_cycle(&store, 1, 1).unwrap());
    }

    #[test]
    fn test_closing_chain_is_cycle() {
        // 1 -> 2 -> 3
        let store = EdgeMap::with_edges(&[(1, 2), (2, 3)]);

        assert!(would_create_cycle(&store, 3, 1).unwrap());
        assert!(would_create_cycle(&store, 2, 1).unwrap());
        assert!(!would_create_cycle(&store, 1, 3).unwrap());
    }

    #[test]
    fn test_diamond_is_not_cycle() {
        // 1 -> {2, 3} -> 4
        let store = EdgeMap::with_edges(&[(1, 2), (1, 3), (2, 4), (3, 4)]);

        assert!(!would_create_cycle(&store, 2, 3).unwrap());
        assert!(!would_create_cycle(&store, 1, 4).unwrap());
        assert!(would_create_cycle(&store, 4, 1).unwrap());
    }

    #[test]
    fn test_closure_of_chain() {
        let store = EdgeMap::with_edges(&[(1, 2), (2, 3), (3, 4)]);

        assert_eq!(transitive_dependencies(&store, 1).unwrap(), BTreeSet::from([2, 3, 4]));
        assert_eq!(transitive_dependencies(&store, 3).unwrap(), BTreeSet::from([4]));
        assert!(transitive_dependencies(&store, 4).unwrap().is_empty());
    }

    #[test]
    fn test_closure_shared_subdependencies() {
        let store = EdgeMap::with_edges(&[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)]);

        assert_eq!(transitive_dependencies(&store, 1).unwrap(), BTreeSet::from([2, 3, 4, 5]));
    }

    #[test]
    fn test_closure_equals_target_closure_plus_target() {
        let store = EdgeMap::with_edges(&[(1, 2), (2, 3), (2, 4), (4, 5)]);

        let mut expected = transitive_dependencies(&store, 2).unwrap();
        expected.insert(2);
        assert_eq!(transitive_dependencies(&store, 1).unwrap(), expected);
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        // Never produced through the store API, but the traversal must still end
        let store = EdgeMap::with_edges(&[(1, 2), (2, 3), (3, 1)]);

        assert_eq!(transitive_dependencies(&store, 1).unwrap(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_closure_missing_task() {
        let store = EdgeMap::with_edges(&[(1, 2)]);

        assert!(matches!(transitive_dependencies(&store, 9), Err(StoreError::TaskNotFound(9))));
    }
}
