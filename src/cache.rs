//! Read-through result cache for listings and dependency closures.
//!
//! The cache is never authoritative. It starts empty, entries are replaced
//! whole, and a miss always recomputes from the graph store.
//!
//! Two namespaces:
//! - listings, keyed by `(page, page_size, status)`, cleared wholesale on any
//!   task mutation and bounded to the most recently used pages;
//! - closures, keyed by task id. When the reachability of task `x` changes,
//!   every cached closure that contains `x` is evicted along with `x`'s own
//!   entry. A cached closure is always current, so containing `x` is exactly
//!   "has a path to `x`".

use crate::types::{TaskId, TaskPage, TaskStatus};
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Listing pages kept before the least recently used one is dropped.
pub const DEFAULT_LISTING_CAPACITY: NonZeroUsize = NonZeroUsize::new(256).unwrap();

/// Cache key for one page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub page: u32,
    pub page_size: u32,
    pub status: Option<TaskStatus>,
}

/// Counters for cache activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Memoized listing pages and transitive-dependency sets.
#[derive(Debug)]
pub struct ResultCache {
    listings: Mutex<LruCache<ListingKey, TaskPage>>,
    closures: RwLock<HashMap<TaskId, BTreeSet<TaskId>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

// Poisoned guards are recovered: every entry is written whole.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::with_listing_capacity(DEFAULT_LISTING_CAPACITY)
    }
}

impl ResultCache {
    /// An empty cache (cold start).
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cache holding at most `capacity` listing pages.
    pub fn with_listing_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            listings: Mutex::new(LruCache::new(capacity)),
            closures: RwLock::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get_listing(&self, key: &ListingKey) -> Option<TaskPage> {
        let found = lock(&self.listings).get(key).cloned();
        self.record(found.is_some());
        found
    }

    /// Store a listing page, dropping the least recently used page when full.
    pub fn put_listing(&self, key: ListingKey, page: TaskPage) {
        let displaced = lock(&self.listings).push(key, page);
        if let Some((old, _)) = displaced
            && old != key
        {
            log::debug!("Listing cache full, dropped {:?}", old);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every cached listing page.
    pub fn clear_listings(&self) -> usize {
        let mut listings = lock(&self.listings);
        let evicted = listings.len();
        listings.clear();
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub fn get_closure(&self, id: TaskId) -> Option<BTreeSet<TaskId>> {
        let found = read(&self.closures).get(&id).cloned();
        self.record(found.is_some());
        found
    }

    /// Store a freshly computed closure.
    ///
    /// If another caller raced us to it, the first value wins; both were
    /// computed from the same graph state.
    pub fn put_closure(&self, id: TaskId, closure: BTreeSet<TaskId>) {
        write(&self.closures).entry(id).or_insert(closure);
    }

    /// Evict `id`'s closure and every cached closure that reaches `id`.
    ///
    /// Returns the evicted keys.
    pub fn invalidate_closures_reaching(&self, id: TaskId) -> Vec<TaskId> {
        let mut closures = write(&self.closures);
        let mut evicted = Vec::new();

        closures.retain(|&key, reached| {
            let stale = key == id || reached.contains(&id);
            if stale {
                evicted.push(key);
            }
            !stale
        });

        self.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        evicted.sort_unstable();
        evicted
    }

    pub fn listing_len(&self) -> usize {
        lock(&self.listings).len()
    }


    pub fn closure_len(&self) -> usize {
        read(&self.closures).len()
    }

    pub fn contains_closure(&self, id: TaskId) -> bool {
        read(&self.closures).contains_key(&id)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}
