//! Taskgraph: a task dependency graph with a coherent result cache.
//!
//! Tasks are linked by directed "depends-on" edges that must stay acyclic.
//! Listings and transitive-dependency queries are served through a
//! read-through cache that is invalidated precisely as the graph changes.
//!
//! # Example
//!
//! ```no_run
//! use taskgraph::{Store, TaskFields};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let store = Store::init(Path::new(".")).unwrap();
//!
//! // Create tasks
//! let deploy = store.create_task(TaskFields::new("Deploy")).unwrap();
//! let build = store.create_task(TaskFields::new("Build")).unwrap();
//! let test = store.create_task(TaskFields::new("Test")).unwrap();
//!
//! // Deploy depends on Test, which depends on Build
//! store.add_dependency(deploy.id, test.id).unwrap();
//! store.add_dependency(test.id, build.id).unwrap();
//!
//! // Closing the loop is rejected
//! assert!(store.add_dependency(build.id, deploy.id).is_err());
//!
//! // Transitive dependencies (cached after the first call)
//! let deps = store.dependencies(deploy.id).unwrap();
//! assert_eq!(deps.len(), 2);
//! ```

mod cache;
mod error;
mod graph;
mod storage;
mod store;
mod types;

pub mod notify;
pub mod protocol;
pub mod server;

// Re-export public API
pub use cache::{CacheStats, DEFAULT_LISTING_CAPACITY, ListingKey, ResultCache};
pub use error::{ErrorKind, Result, StoreError};
pub use graph::{transitive_dependencies, would_create_cycle};
pub use protocol::{Request, Response};
pub use server::{Server, ServerConfig};
pub use storage::{GraphStore, Storage};
pub use store::Store;
pub use types::{
    DependencyEdge, MAX_PAGE_SIZE, Priority, Task, TaskFields, TaskId, TaskPage, TaskStatus, ValidationError,
};
