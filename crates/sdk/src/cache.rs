//! Query cache.
//!
//! Entries are keyed by hierarchical [`QueryKey`]s so a whole subtree (every
//! basket of a webstore, say) can be invalidated or removed at once. Each key
//! also carries a generation: a fetch records the generation it started at and
//! only writes its result if nothing touched the key in the meantime, so the
//! latest resolution wins.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{Mutex, MutexGuard, PoisonError},
};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Hierarchical cache key, e.g. `[token, "baskets", ident]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(SmallVec<[String; 4]>);

impl QueryKey {
    /// Single-segment key.
    pub fn new(root: impl Into<String>) -> Self {
        let mut segments = SmallVec::new();
        segments.push(root.into());

        Self(segments)
    }

    /// This key extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());

        Self(segments)
    }

    /// Key segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `prefix` is this key or one of its ancestors.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Key constructors, all scoped under a webstore namespace.
pub mod keys {
    use super::QueryKey;

    /// Root of everything cached for one webstore.
    pub fn root(namespace: &str) -> QueryKey {
        QueryKey::new(namespace)
    }

    /// Every basket of the webstore.
    pub fn baskets(namespace: &str) -> QueryKey {
        root(namespace).child("baskets")
    }

    /// One basket.
    pub fn basket(namespace: &str, ident: &str) -> QueryKey {
        baskets(namespace).child(ident)
    }

    /// Webstore metadata.
    pub fn webstore(namespace: &str) -> QueryKey {
        root(namespace).child("webstore")
    }

    /// Category listing, with or without packages.
    pub fn categories(namespace: &str, include_packages: bool) -> QueryKey {
        root(namespace)
            .child("categories")
            .child(if include_packages { "with-packages" } else { "plain" })
    }

    /// One category.
    pub fn category(namespace: &str, id: u64) -> QueryKey {
        root(namespace).child("category").child(id.to_string())
    }

    /// Package listing.
    pub fn packages(namespace: &str) -> QueryKey {
        root(namespace).child("packages").child("all")
    }

    /// One package.
    pub fn package(namespace: &str, id: u64) -> QueryKey {
        root(namespace).child("packages").child(id.to_string())
    }
}

/// Keyed, invalidatable cache.
pub trait Cache<V>: Send + Sync {
    /// Current value, fresh or stale.
    fn get(&self, key: &QueryKey) -> Option<V>;

    /// Whether `key` is absent or has been invalidated.
    fn is_stale(&self, key: &QueryKey) -> bool;

    /// Store a fresh value.
    fn set(&self, key: &QueryKey, value: V);

    /// Patch the value in place and return the value it had before.
    ///
    /// Reading the snapshot and applying the patch is one indivisible step.
    /// Returns `None` without calling `patch` when `key` is absent.
    fn update(&self, key: &QueryKey, patch: &mut dyn FnMut(&mut V)) -> Option<V>;

    /// Drop every entry under `prefix` and discard fetches in flight for them.
    fn remove(&self, prefix: &QueryKey);

    /// Mark every entry under `prefix` stale, keeping the values.
    fn invalidate(&self, prefix: &QueryKey);

    /// Discard the results of fetches in flight under `prefix`.
    fn cancel_in_flight(&self, prefix: &QueryKey);

    /// Generation a fetch for `key` should record before it starts.
    fn generation(&self, key: &QueryKey) -> u64;

    /// Store `value` only if `key` is still at `generation`.
    fn set_if_current(&self, key: &QueryKey, value: V, generation: u64) -> bool;
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stale: bool,
}

#[derive(Debug)]
struct Inner<V> {
    entries: FxHashMap<QueryKey, Entry<V>>,
    generations: FxHashMap<QueryKey, u64>,
    /// Source of generation numbers; never repeats.
    clock: u64,
    /// Generation of keys with no recorded generation, moved on every removal.
    floor: u64,
}

impl<V> Inner<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn current(&self, key: &QueryKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(self.floor)
    }

    fn bump(&mut self, key: &QueryKey) {
        let generation = self.tick();

        self.generations.insert(key.clone(), generation);
    }

    fn bump_under(&mut self, prefix: &QueryKey) {
        let next = self.tick();

        self.generations
            .iter_mut()
            .filter(|(key, _)| key.starts_with(prefix))
            .for_each(|(_, generation)| *generation = next);
    }
}

/// In-memory [`Cache`].
#[derive(Debug)]
pub struct MemoryCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> MemoryCache<V> {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                generations: FxHashMap::default(),
                clock: 0,
                floor: 0,
            }),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> Cache<V> for MemoryCache<V> {
    fn get(&self, key: &QueryKey) -> Option<V> {
        self.lock().entries.get(key).map(|entry| entry.value.clone())
    }

    fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock().entries.get(key).is_none_or(|entry| entry.stale)
    }

    fn set(&self, key: &QueryKey, value: V) {
        let mut inner = self.lock();

        inner.bump(key);
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                stale: false,
            },
        );
    }

    fn update(&self, key: &QueryKey, patch: &mut dyn FnMut(&mut V)) -> Option<V> {
        let mut inner = self.lock();

        let entry = inner.entries.get_mut(key)?;
        let snapshot = entry.value.clone();

        patch(&mut entry.value);

        Some(snapshot)
    }

    fn remove(&self, prefix: &QueryKey) {
        let mut inner = self.lock();

        inner.entries.retain(|key, _| !key.starts_with(prefix));
        inner.generations.retain(|key, _| !key.starts_with(prefix));
        inner.floor = inner.tick();
    }

    fn invalidate(&self, prefix: &QueryKey) {
        self.lock()
            .entries
            .iter_mut()
            .filter(|(key, _)| key.starts_with(prefix))
            .for_each(|(_, entry)| entry.stale = true);
    }

    fn cancel_in_flight(&self, prefix: &QueryKey) {
        self.lock().bump_under(prefix);
    }

    fn generation(&self, key: &QueryKey) -> u64 {
        let mut inner = self.lock();
        let floor = inner.floor;

        *inner.generations.entry(key.clone()).or_insert(floor)
    }

    fn set_if_current(&self, key: &QueryKey, value: V, generation: u64) -> bool {
        let mut inner = self.lock();

        if inner.current(key) != generation {
            return false;
        }

        inner.bump(key);
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                stale: false,
            },
        );

        true
    }
}
