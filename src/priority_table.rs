//! Shared cost-weighted node deduplication table.
//!
//! A single fixed-capacity slot array serves every generation at once:
//! entries are keyed by `(key, generation)` and placed by bounded open
//! addressing, so the table's memory footprint is decided at construction
//! and never grows. Contention for a probe window is resolved by priority:
//! entries start at their caller-supplied admission cost and age upward on
//! every hit, so cheap entries yield to expensive ones.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                        PriorityTable<K>                              │
//!   │                                                                      │
//!   │   slots: Box<[Option<Slot>]>, len = N = 1 << log2n                   │
//!   │                                                                      │
//!   │   put/get (k, g):  h = hash(g, k) & (N-1)                            │
//!   │                                                                      │
//!   │        h        h+1       h+2       h+3      ◄── probe window P = 4  │
//!   │   ┌─────────┬─────────┬─────────┬─────────┐                          │
//!   │   │ k₀ g=4  │ k₁ g=4  │  empty  │ k₂ g=3  │                          │
//!   │   │ prio 12 │ prio 3  │         │ prio 40 │                          │
//!   │   └─────────┴─────────┴─────────┴─────────┘                          │
//!   │                                                                      │
//!   │   put(k, v, g, cost):                                                │
//!   │     first empty slot in window  → occupy, priority = cost            │
//!   │     window full                 → overwrite lowest priority          │
//!   │                                   iff its priority < cost            │
//!   │     otherwise                   → drop silently                      │
//!   │                                                                      │
//!   │   get(k, g): match key AND generation, priority += 1 (sat. at 255)   │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Generation-scoped lookups never observe an entry stored under another
//! generation: the generation participates in both the placement hash and
//! the slot match. `retire` clears matching slots in place, so lookups
//! must always walk the full window; an empty slot does not terminate a
//! probe chain.
//!
//! ## Key Components
//!
//! - [`PriorityTable`]: single-owner core with `&mut self` operations.
//! - [`ConcurrentPriorityTable`]: the core behind one `RwLock`; `get`,
//!   `put`, and `retire` take the write lock (a hit mutates the slot's
//!   priority), stats reads share the read lock. Each operation is
//!   linearizable under the lock.
//!
//! Capacity must be a power of two. Capacity 0 is additionally legal and
//! yields a permanent no-op table (backing the empty cache manager).

use std::hash::{Hash, Hasher};
use std::mem;

use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::metrics::snapshot::CacheStatsSnapshot;
use crate::record::{Generation, RecordId};

/// Number of slots examined per lookup or insert.
const PROBE_WINDOW: usize = 4;

/// Number of distinct priority values, hence eviction/occupancy buckets.
const PRIORITY_BUCKETS: usize = 1 << u8::BITS;

#[derive(Debug)]
struct Slot<K> {
    key: K,
    generation: Generation,
    value: RecordId,
    cost: u8,
    priority: u8,
}

/// Fixed-capacity open-addressed deduplication table keyed by
/// `(key, generation)` with cost-weighted eviction.
///
/// # Example
///
/// ```
/// use dedupkit::priority_table::PriorityTable;
/// use dedupkit::record::RecordId;
///
/// let mut table = PriorityTable::new(8);
/// table.put("stable-id", RecordId::new(1, 0), 4, 10);
///
/// // Lookups are generation-scoped.
/// assert_eq!(table.get(&"stable-id", 4), Some(RecordId::new(1, 0)));
/// assert_eq!(table.get(&"stable-id", 5), None);
/// ```
#[derive(Debug)]
pub struct PriorityTable<K> {
    slots: Box<[Option<Slot<K>>]>,
    mask: usize,
    len: usize,
    hits: u64,
    misses: u64,
    loads: u64,
    evictions: Box<[u64; PRIORITY_BUCKETS]>,
}

impl<K> PriorityTable<K>
where
    K: Eq + Hash,
{
    /// Creates a table with the given number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is neither zero nor a power of two. Use
    /// [`try_new`](Self::try_new) for host-supplied values.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(table) => table,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a table with the given number of slots, rejecting
    /// capacities that are neither zero nor a power of two.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity != 0 && !capacity.is_power_of_two() {
            return Err(ConfigError::new(format!(
                "priority table capacity must be a power of two, got {capacity}"
            )));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity.saturating_sub(1),
            len: 0,
            hits: 0,
            misses: 0,
            loads: 0,
            evictions: Box::new([0; PRIORITY_BUCKETS]),
        })
    }

    /// Returns the fixed number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket(&self, key: &K, generation: Generation) -> usize {
        let mut hasher = FxHasher::default();
        generation.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Returns the locator stored under `(key, generation)` and bumps the
    /// matched slot's priority, saturating at `u8::MAX`.
    pub fn get(&mut self, key: &K, generation: Generation) -> Option<RecordId> {
        if self.slots.is_empty() {
            self.misses += 1;
            return None;
        }
        let start = self.bucket(key, generation);
        for step in 0..PROBE_WINDOW {
            let idx = (start + step) & self.mask;
            if let Some(slot) = self.slots[idx].as_mut() {
                if slot.generation == generation && slot.key == *key {
                    slot.priority = slot.priority.saturating_add(1);
                    let value = slot.value;
                    self.hits += 1;
                    return Some(value);
                }
            }
        }
        self.misses += 1;
        None
    }

    /// Inserts `(key, generation) → value` with the given admission cost.
    ///
    /// The first empty slot in the probe window is occupied directly.
    /// With the window full, the lowest-priority slot is overwritten iff
    /// its priority is strictly below `cost`; otherwise the insert is
    /// dropped. Returns whether the entry was stored.
    pub fn put(&mut self, key: K, value: RecordId, generation: Generation, cost: u8) -> bool {
        self.loads += 1;
        if self.slots.is_empty() {
            return false;
        }
        let start = self.bucket(&key, generation);
        let mut victim: Option<(usize, u8)> = None;
        for step in 0..PROBE_WINDOW {
            let idx = (start + step) & self.mask;
            match &self.slots[idx] {
                None => {
                    self.slots[idx] = Some(Slot {
                        key,
                        generation,
                        value,
                        cost,
                        priority: cost,
                    });
                    self.len += 1;
                    return true;
                },
                Some(slot) => {
                    if victim.map_or(true, |(_, lowest)| slot.priority < lowest) {
                        victim = Some((idx, slot.priority));
                    }
                },
            }
        }
        match victim {
            Some((idx, lowest)) if lowest < cost => {
                self.evictions[lowest as usize] += 1;
                self.slots[idx] = Some(Slot {
                    key,
                    generation,
                    value,
                    cost,
                    priority: cost,
                });
                true
            },
            _ => false,
        }
    }

    /// Clears every slot whose generation satisfies `predicate`. No
    /// compaction or rehashing is performed. Returns the number of
    /// cleared slots.
    pub fn retire<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(Generation) -> bool,
    {
        let mut cleared = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| predicate(s.generation)) {
                *slot = None;
                cleared += 1;
            }
        }
        self.len -= cleared;
        cleared
    }

    /// Approximate memory weight of the occupied slots, in bytes.
    pub fn weight(&self) -> u64 {
        (self.len * mem::size_of::<Slot<K>>()) as u64
    }

    /// Snapshot of counters plus current occupancy and weight.
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits,
            misses: self.misses,
            loads: self.loads,
            evictions: self.evictions.iter().sum(),
            size: self.len as u64,
            weight: self.weight(),
        }
    }

    /// Eviction counts indexed by the priority the displaced entry held.
    pub fn evictions_by_priority(&self) -> &[u64; PRIORITY_BUCKETS] {
        &self.evictions
    }

    /// Occupied-slot counts per current priority, from one full scan.
    pub fn occupancy_by_priority(&self) -> Box<[u64; PRIORITY_BUCKETS]> {
        let mut buckets = Box::new([0u64; PRIORITY_BUCKETS]);
        for slot in self.slots.iter().flatten() {
            buckets[slot.priority as usize] += 1;
        }
        buckets
    }

    /// Occupied-slot counts per admission cost, from one full scan.
    ///
    /// Comparing this against [`occupancy_by_priority`] shows how far the
    /// resident population has aged beyond its admission costs.
    ///
    /// [`occupancy_by_priority`]: Self::occupancy_by_priority
    pub fn occupancy_by_cost(&self) -> Box<[u64; PRIORITY_BUCKETS]> {
        let mut buckets = Box::new([0u64; PRIORITY_BUCKETS]);
        for slot in self.slots.iter().flatten() {
            buckets[slot.cost as usize] += 1;
        }
        buckets
    }

    /// Human-readable occupancy summary bucketed by priority.
    pub fn occupancy_summary(&self) -> String {
        use std::fmt::Write as _;

        let occupied = self.occupancy_by_priority();
        let mut summary = format!(
            "size {}/{}, weight {}",
            self.len,
            self.capacity(),
            self.weight()
        );
        let mut any = false;
        for priority in 0..PRIORITY_BUCKETS {
            let slots = occupied[priority];
            let evicted = self.evictions[priority];
            if slots == 0 && evicted == 0 {
                continue;
            }
            if !any {
                summary.push_str("; priorities:");
                any = true;
            }
            let _ = write!(summary, " [{priority}: {slots} occupied, {evicted} evicted]");
        }
        summary
    }

    #[cfg(test)]
    fn priority_of(&self, key: &K, generation: Generation) -> Option<u8> {
        let start = self.bucket(key, generation);
        for step in 0..PROBE_WINDOW {
            let idx = (start + step) & self.mask;
            if let Some(slot) = &self.slots[idx] {
                if slot.generation == generation && slot.key == *key {
                    return Some(slot.priority);
                }
            }
        }
        None
    }
}

/// Thread-safe priority table: one [`PriorityTable`] behind an `RwLock`.
///
/// Cloning yields another handle to the same table; this is how the
/// manager binds per-generation node-cache views onto the shared table.
#[derive(Debug)]
pub struct ConcurrentPriorityTable<K> {
    inner: Arc<RwLock<PriorityTable<K>>>,
}

impl<K> Clone for ConcurrentPriorityTable<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> ConcurrentPriorityTable<K>
where
    K: Eq + Hash,
{
    /// Creates a shared table with the given number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is neither zero nor a power of two. Use
    /// [`try_new`](Self::try_new) for host-supplied values.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PriorityTable::new(capacity))),
        }
    }

    /// Creates a shared table, rejecting capacities that are neither zero
    /// nor a power of two.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Arc::new(RwLock::new(PriorityTable::try_new(capacity)?)),
        })
    }

    /// Returns the locator stored under `(key, generation)`, bumping the
    /// matched slot's priority.
    pub fn get(&self, key: &K, generation: Generation) -> Option<RecordId> {
        self.inner.write().get(key, generation)
    }

    /// Inserts `(key, generation) → value` with the given admission cost.
    /// Returns whether the entry was stored.
    pub fn put(&self, key: K, value: RecordId, generation: Generation, cost: u8) -> bool {
        self.inner.write().put(key, value, generation, cost)
    }

    /// Clears every slot whose generation satisfies `predicate`. Returns
    /// the number of cleared slots.
    pub fn retire<F>(&self, predicate: F) -> usize
    where
        F: Fn(Generation) -> bool,
    {
        self.inner.write().retire(predicate)
    }

    /// Returns the fixed number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Human-readable occupancy summary bucketed by priority.
    pub fn occupancy_summary(&self) -> String {
        self.inner.read().occupancy_summary()
    }
}

impl<K> crate::traits::CacheStatsSource for ConcurrentPriorityTable<K>
where
    K: Eq + Hash,
{
    fn size(&self) -> u64 {
        self.inner.read().len() as u64
    }

    fn weight(&self) -> u64 {
        self.inner.read().weight()
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.inner.read().stats()
    }
}
