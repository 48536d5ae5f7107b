//! Keyed container sorted on demand.
//!
//! Entries appended in key order stay sorted for free. An insert below the
//! current minimum is shifted into place; any other out-of-order insert marks
//! the container dirty and the sort is deferred until the next read.

use pricestats_core::{Error, MissResolution, Result};
use std::fmt;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Ordering state of the backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortState {
    /// Entries are non-decreasing by key.
    Sorted,
    /// At least one entry was appended out of order.
    Dirty,
}

/// A key/value pair owned by a [`SortedSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct SortedEntry<K, V> {
    pub key: K,
    pub value: V,
}

#[derive(Debug)]
struct Storage<K, V> {
    entries: Vec<SortedEntry<K, V>>,
    state: SortState,
}

/// Sorted map keyed by `K` with lazy sort and miss-resolution lookups.
pub struct SortedSeries<K, V> {
    storage: RwLock<Storage<K, V>>,
}

/// Resolve `key` to an index of `entries` under `policy`.
///
/// `entries` must be sorted.
fn resolve<K, V>(
    entries: &[SortedEntry<K, V>],
    key: &K,
    policy: MissResolution,
) -> Result<Option<usize>>
where
    K: Ord + fmt::Display,
{
    match entries.binary_search_by(|e| e.key.cmp(key)) {
        Ok(i) => Ok(Some(i)),
        Err(i) => match policy {
            MissResolution::Invalid => Ok(None),
            MissResolution::Preceding => Ok(i.checked_sub(1)),
            MissResolution::Following => Ok((i < entries.len()).then_some(i)),
            MissResolution::Raise => Err(Error::not_found(key)),
        },
    }
}

/// Half-open index bounds of the entries with `from <= key <= to`.
fn range_bounds<K: Ord, V>(entries: &[SortedEntry<K, V>], from: &K, to: &K) -> (usize, usize) {
    let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
    let start = entries.partition_point(|e| e.key < *lo);
    let end = entries.partition_point(|e| e.key <= *hi);
    (start, end.max(start))
}

impl<K, V> SortedSeries<K, V>
where
    K: Ord + Copy + fmt::Display,
    V: Clone,
{
    /// Create an empty container.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty container with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RwLock::new(Storage {
                entries: Vec::with_capacity(capacity),
                state: SortState::Sorted,
            }),
        }
    }

    /// Sort if dirty, then hand out a read guard over sorted entries.
    fn sorted(&self) -> RwLockReadGuard<'_, Storage<K, V>> {
        self.ensure_sorted();
        self.storage.read()
    }

    /// Add an entry.
    ///
    /// O(1) amortized for in-order appends, O(n) for a new minimum key.
    pub fn add(&mut self, key: K, value: V) {
        let storage = self.storage.get_mut();
        let entry = SortedEntry { key, value };

        if storage.state == SortState::Dirty {
            storage.entries.push(entry);
            return;
        }

        let first = storage.entries.first().map(|e| e.key);
        let last = storage.entries.last().map(|e| e.key);
        match (first, last) {
            (Some(first), Some(last)) if key < last => {
                if key < first {
                    storage.entries.insert(0, entry);
                } else {
                    storage.entries.push(entry);
                    storage.state = SortState::Dirty;
                }
            }
            _ => storage.entries.push(entry),
        }
    }

    /// Sort the backing storage if an out-of-order insert left it dirty.
    ///
    /// Returns whether this call performed the sort.
    pub fn ensure_sorted(&self) -> bool {
        if self.storage.read().state == SortState::Sorted {
            return false;
        }

        let mut storage = self.storage.write();
        // Another reader may have sorted while we waited for the lock.
        if storage.state == SortState::Sorted {
            return false;
        }
        storage.entries.sort_by(|a, b| a.key.cmp(&b.key));
        storage.state = SortState::Sorted;
        debug!(entries = storage.entries.len(), "resorted dirty series");
        true
    }

    /// Current ordering state.
    pub fn state(&self) -> SortState {
        self.storage.read().state
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.storage.read().entries.len()
    }

    /// Whether the container holds no entries.
    pub fn is_empty(&self) -> bool {
        self.storage.read().entries.is_empty()
    }

    /// Index of `key`, resolved under `policy` on a miss.
    pub fn index_of(&self, key: K, policy: MissResolution) -> Result<Option<usize>> {
        resolve(&self.sorted().entries, &key, policy)
    }

    /// Entry for `key`, resolved under `policy` on a miss.
    pub fn get(&self, key: K, policy: MissResolution) -> Result<Option<SortedEntry<K, V>>> {
        let storage = self.sorted();
        let index = resolve(&storage.entries, &key, policy)?;
        Ok(index.map(|i| storage.entries[i].clone()))
    }

    /// Value stored exactly at `key`.
    pub fn get_exact(&self, key: K) -> Option<V> {
        let storage = self.sorted();
        storage
            .entries
            .binary_search_by(|e| e.key.cmp(&key))
            .ok()
            .map(|i| storage.entries[i].value.clone())
    }

    /// Whether an entry with exactly `key` exists.
    pub fn contains_key(&self, key: K) -> bool {
        let storage = self.sorted();
        storage.entries.binary_search_by(|e| e.key.cmp(&key)).is_ok()
    }

    /// Entry at a sorted position.
    pub fn entry_at(&self, index: usize) -> Option<SortedEntry<K, V>> {
        self.sorted().entries.get(index).cloned()
    }

    /// Entry with the smallest key.
    pub fn first(&self) -> Option<SortedEntry<K, V>> {
        self.sorted().entries.first().cloned()
    }

    /// Entry with the largest key.
    pub fn last(&self) -> Option<SortedEntry<K, V>> {
        self.sorted().entries.last().cloned()
    }

    /// Run `f` over the contiguous entries with keys between `from` and `to`.
    ///
    /// Bounds may be given in either order and are clamped to the stored
    /// keys, so the slice is empty only when no key falls in the range.
    pub fn with_range<R>(&self, from: K, to: K, f: impl FnOnce(&[SortedEntry<K, V>]) -> R) -> R {
        let storage = self.sorted();
        let (start, end) = range_bounds(&storage.entries, &from, &to);
        f(&storage.entries[start..end])
    }

    /// Run `f` over every entry in key order.
    pub fn with_entries<R>(&self, f: impl FnOnce(&[SortedEntry<K, V>]) -> R) -> R {
        f(&self.sorted().entries)
    }

    /// Copy of the entries with keys between `from` and `to`.
    pub fn range(&self, from: K, to: K) -> Vec<SortedEntry<K, V>> {
        self.with_range(from, to, <[SortedEntry<K, V>]>::to_vec)
    }

    /// Independent container holding the entries between `from` and `to`.
    pub fn clone_range(&self, from: K, to: K) -> Self {
        Self {
            storage: RwLock::new(Storage {
                entries: self.range(from, to),
                state: SortState::Sorted,
            }),
        }
    }

    /// Copy of every value in key order.
    pub fn values(&self) -> Vec<V> {
        self.sorted().entries.iter().map(|e| e.value.clone()).collect()
    }

    /// Scan backwards from `key` (inclusive) for an entry matching `predicate`.
    ///
    /// At most `max_tries` entries are examined; `None` when none of them
    /// match or no entry lies at or before `key`.
    pub fn find_back(
        &self,
        key: K,
        max_tries: usize,
        predicate: impl Fn(&SortedEntry<K, V>) -> bool,
    ) -> Option<SortedEntry<K, V>> {
        let storage = self.sorted();
        let start = resolve(&storage.entries, &key, MissResolution::Preceding).ok()??;
        storage.entries[..=start]
            .iter()
            .rev()
            .take(max_tries)
            .find(|e| predicate(e))
            .cloned()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        let storage = self.storage.get_mut();
        storage.entries.clear();
        storage.state = SortState::Sorted;
    }
}

impl<K, V> Default for SortedSeries<K, V>
where
    K: Ord + Copy + fmt::Display,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for SortedSeries<K, V>
where
    K: Ord + Copy + fmt::Display,
    V: Clone,
{
    fn clone(&self) -> Self {
        let storage = self.storage.read();
        Self {
            storage: RwLock::new(Storage {
                entries: storage.entries.clone(),
                state: storage.state,
            }),
        }
    }
}

impl<K, V> fmt::Debug for SortedSeries<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.storage.read();
        f.debug_struct("SortedSeries")
            .field("state", &storage.state)
            .field("len", &storage.entries.len())
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for SortedSeries<K, V>
where
    K: Ord + Copy + fmt::Display,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut series = Self::new();
        for (key, value) in iter {
            series.add(key, value);
        }
        series
    }
}
