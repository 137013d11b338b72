//! Bounded deduplication map from a logical key to its record locator.
//!
//! One `RecordMap` exists per (cache family, generation) and answers "was
//! a record with this identity already written in this generation?". The
//! map stores locators directly (no per-value allocation), indexes keys
//! with `FxHashMap`, and keeps an intrusive doubly-linked list for LRU
//! eviction when the configured capacity is exceeded.
//!
//! ## When to Use
//!
//! - [`RecordMap`]: single-owner core with `&mut self` operations.
//! - [`ConcurrentRecordMap`]: the same map behind one mutex, cheap to
//!   clone and share across writer threads. Per-generation sharding
//!   already spreads contention, so a single lock per instance is enough.
//!
//! Capacity 0 is legal and yields a permanent no-op map: every `get`
//! misses and every `put` is dropped silently.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metrics::snapshot::CacheStatsSnapshot;
use crate::record::RecordId;

/// Node in the LRU linked list.
///
/// Layout keeps the list pointers first so traversal touches one cache
/// line before the key.
#[repr(C)]
struct Node<K> {
    prev: Option<NonNull<Node<K>>>,
    next: Option<NonNull<Node<K>>>,
    key: K,
    value: RecordId,
}

/// A bounded map from logical key to [`RecordId`] with LRU eviction.
///
/// All operations are O(1) average case. Hit, miss, load, and eviction
/// counters are maintained internally and exposed through [`stats`].
///
/// [`stats`]: RecordMap::stats
///
/// # Example
///
/// ```
/// use dedupkit::record::RecordId;
/// use dedupkit::record_map::RecordMap;
///
/// let mut map = RecordMap::new(2);
/// map.put("a".to_string(), RecordId::new(1, 0));
/// map.put("b".to_string(), RecordId::new(2, 0));
///
/// assert_eq!(map.get(&"a".to_string()), Some(RecordId::new(1, 0)));
///
/// // "a" was just refreshed, so a third insert evicts "b".
/// map.put("c".to_string(), RecordId::new(3, 0));
/// assert_eq!(map.get(&"b".to_string()), None);
/// ```
pub struct RecordMap<K> {
    index: FxHashMap<K, NonNull<Node<K>>>,
    head: Option<NonNull<Node<K>>>,
    tail: Option<NonNull<Node<K>>>,
    capacity: usize,
    hits: u64,
    misses: u64,
    loads: u64,
    evictions: u64,
}

impl<K> RecordMap<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a map holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            head: None,
            tail: None,
            capacity,
            hits: 0,
            misses: 0,
            loads: 0,
            evictions: 0,
        }
    }

    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the configured maximum size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the locator stored under `key` and refreshes its LRU
    /// position. Counts a hit or a miss.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<RecordId> {
        let node_ptr = match self.index.get(key) {
            Some(&ptr) => ptr,
            None => {
                self.misses += 1;
                return None;
            },
        };

        self.hits += 1;
        self.detach(node_ptr);
        self.attach_front(node_ptr);

        // SAFETY: node_ptr is valid as long as it's in the index
        Some(unsafe { (*node_ptr.as_ptr()).value })
    }

    /// Inserts or updates `key → value`, evicting the least recently used
    /// entry when the map is full. Counts a load; a put on a capacity-0
    /// map is dropped silently.
    pub fn put(&mut self, key: K, value: RecordId) {
        self.loads += 1;

        if self.capacity == 0 {
            return;
        }

        if let Some(&node_ptr) = self.index.get(&key) {
            // SAFETY: node_ptr is valid as long as it's in the index
            unsafe {
                (*node_ptr.as_ptr()).value = value;
            }
            self.detach(node_ptr);
            self.attach_front(node_ptr);
            return;
        }

        if self.index.len() >= self.capacity && self.pop_lru().is_some() {
            self.evictions += 1;
        }

        let node = Box::new(Node {
            prev: None,
            next: None,
            key: key.clone(),
            value,
        });
        let node_ptr = NonNull::from(Box::leak(node));

        self.index.insert(key, node_ptr);
        self.attach_front(node_ptr);
    }

    /// Approximate memory weight: entry count times the per-entry size
    /// estimate. Key payloads (string bytes etc.) are not weighed.
    pub fn weight(&self) -> u64 {
        (self.index.len() * mem::size_of::<Node<K>>()) as u64
    }

    /// Snapshot of counters plus current size and weight.
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits,
            misses: self.misses,
            loads: self.loads,
            evictions: self.evictions,
            size: self.len() as u64,
            weight: self.weight(),
        }
    }

    /// Removes and returns the least recently used entry.
    fn pop_lru(&mut self) -> Option<(K, RecordId)> {
        let tail_ptr = self.tail?;

        // SAFETY: tail is valid if Some
        let key = unsafe { (*tail_ptr.as_ptr()).key.clone() };

        self.index.remove(&key);
        self.detach(tail_ptr);

        // SAFETY: the node is no longer reachable through the index
        let node = unsafe { Box::from_raw(tail_ptr.as_ptr()) };
        Some((node.key, node.value))
    }

    // =========================================================================
    // Internal linked-list operations
    // =========================================================================

    /// Detaches a node from its current position in the list.
    #[inline]
    fn detach(&mut self, node_ptr: NonNull<Node<K>>) {
        unsafe {
            let node = node_ptr.as_ptr();
            let prev = (*node).prev;
            let next = (*node).next;

            match prev {
                Some(prev_ptr) => (*prev_ptr.as_ptr()).next = next,
                None => self.head = next,
            }

            match next {
                Some(next_ptr) => (*next_ptr.as_ptr()).prev = prev,
                None => self.tail = prev,
            }

            (*node).prev = None;
            (*node).next = None;
        }
    }

    /// Attaches a node at the front (MRU position) of the list.
    #[inline]
    fn attach_front(&mut self, node_ptr: NonNull<Node<K>>) {
        unsafe {
            let node = node_ptr.as_ptr();
            (*node).prev = None;
            (*node).next = self.head;

            match self.head {
                Some(head_ptr) => (*head_ptr.as_ptr()).prev = Some(node_ptr),
                None => self.tail = Some(node_ptr),
            }

            self.head = Some(node_ptr);
        }
    }
}

impl<K> Drop for RecordMap<K> {
    fn drop(&mut self) {
        let mut current = self.head;
        while let Some(node_ptr) = current {
            unsafe {
                let node = Box::from_raw(node_ptr.as_ptr());
                current = node.next;
            }
        }
    }
}

// SAFETY: RecordMap owns its nodes exclusively; moving the map between
// threads moves ownership of every node with it.
unsafe impl<K: Send> Send for RecordMap<K> {}

/// Thread-safe record map: one [`RecordMap`] behind a single mutex.
///
/// Cloning yields another handle to the same map, which is how the
/// manager shares a generation's map between writer threads.
pub struct ConcurrentRecordMap<K> {
    inner: Arc<Mutex<RecordMap<K>>>,
}

impl<K> Clone for ConcurrentRecordMap<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> ConcurrentRecordMap<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a shared map holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecordMap::new(capacity))),
        }
    }

    /// Returns the locator stored under `key`, refreshing its LRU
    /// position.
    pub fn get(&self, key: &K) -> Option<RecordId> {
        self.inner.lock().get(key)
    }

    /// Inserts or updates `key → value`, evicting the LRU entry when
    /// full.
    pub fn put(&self, key: K, value: RecordId) {
        self.inner.lock().put(key, value);
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the configured maximum size.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

impl<K> crate::traits::DedupCache<K> for ConcurrentRecordMap<K>
where
    K: Eq + Hash + Clone,
{
    fn get(&self, key: &K) -> Option<RecordId> {
        ConcurrentRecordMap::get(self, key)
    }

    fn put(&self, key: K, value: RecordId) -> Result<(), crate::error::UnsupportedOperation> {
        ConcurrentRecordMap::put(self, key, value);
        Ok(())
    }

    fn put_weighted(
        &self,
        _key: K,
        _value: RecordId,
        _cost: u8,
    ) -> Result<(), crate::error::UnsupportedOperation> {
        Err(crate::error::UnsupportedOperation::new(
            "record maps do not weigh entries; use put(key, value)",
        ))
    }
}

impl<K> crate::traits::CacheStatsSource for ConcurrentRecordMap<K>
where
    K: Eq + Hash + Clone,
{
    fn size(&self) -> u64 {
        self.inner.lock().len() as u64
    }

    fn weight(&self) -> u64 {
        self.inner.lock().weight()
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.inner.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DedupCache;

    fn rid(n: u32) -> RecordId {
        RecordId::new(n as u128, n)
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut map = RecordMap::new(4);
        map.put(1u64, rid(10));
        map.put(2u64, rid(20));

        assert_eq!(map.get(&1), Some(rid(10)));
        assert_eq!(map.get(&2), Some(rid(20)));
        assert_eq!(map.get(&3), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let mut map = RecordMap::new(2);
        map.put(1u64, rid(1));
        map.put(2u64, rid(2));

        // Refresh 1 so 2 becomes the LRU victim.
        map.get(&1);
        map.put(3u64, rid(3));

        assert_eq!(map.get(&1), Some(rid(1)));
        assert_eq!(map.get(&2), None);
        assert_eq!(map.get(&3), Some(rid(3)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn update_existing_key_does_not_grow() {
        let mut map = RecordMap::new(2);
        map.put(1u64, rid(1));
        map.put(1u64, rid(99));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(rid(99)));
    }

    #[test]
    fn zero_capacity_is_a_permanent_noop() {
        let mut map = RecordMap::new(0);
        map.put(1u64, rid(1));

        assert!(map.is_empty());
        assert_eq!(map.get(&1), None);

        let stats = map.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn counters_track_hits_misses_loads_evictions() {
        let mut map = RecordMap::new(1);
        map.get(&1u64);
        map.put(1u64, rid(1));
        map.get(&1);
        map.put(2u64, rid(2)); // evicts 1

        let stats = map.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn weight_scales_with_len() {
        let mut map = RecordMap::new(8);
        assert_eq!(map.weight(), 0);
        map.put(1u64, rid(1));
        let one = map.weight();
        map.put(2u64, rid(2));
        assert_eq!(map.weight(), 2 * one);
        assert!(one > 0);
    }

    #[test]
    fn concurrent_handles_share_state() {
        let map = ConcurrentRecordMap::new(4);
        let other = map.clone();

        map.put("k".to_string(), rid(7));
        assert_eq!(other.get(&"k".to_string()), Some(rid(7)));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn weighted_put_is_unsupported() {
        let map: ConcurrentRecordMap<String> = ConcurrentRecordMap::new(4);
        let err = map
            .put_weighted("k".to_string(), rid(1), 3)
            .unwrap_err();
        assert!(err.message().contains("weigh"));
        // The bare form works.
        DedupCache::put(&map, "k".to_string(), rid(1)).unwrap();
        assert_eq!(DedupCache::get(&map, &"k".to_string()), Some(rid(1)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn rid(n: u32) -> RecordId {
        RecordId::new(n as u128, n)
    }

    proptest! {
        /// Property: size never exceeds the configured capacity
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_len_bounded_by_capacity(
            capacity in 0usize..16,
            keys in prop::collection::vec(0u64..64, 0..200)
        ) {
            let mut map = RecordMap::new(capacity);
            for key in keys {
                map.put(key, rid(key as u32));
                prop_assert!(map.len() <= capacity);
            }
        }

        /// Property: with capacity >= distinct keys, get returns the last
        /// put value for every key (no eviction can occur)
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_round_trip_without_eviction(
            puts in prop::collection::vec((0u64..32, any::<u32>()), 1..100)
        ) {
            let mut map = RecordMap::new(32);
            let mut expected = std::collections::HashMap::new();
            for (key, value) in puts {
                map.put(key, rid(value));
                expected.insert(key, rid(value));
            }
            for (key, value) in expected {
                prop_assert_eq!(map.get(&key), Some(value));
            }
        }
    }
}
