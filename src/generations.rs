//! Lazy per-generation cache construction with at-most-once semantics.
//!
//! The writer requests caches by generation, and generations appear on
//! demand: the first thread to ask for a generation builds its cache,
//! every later (or racing) thread observes the same instance. Compaction
//! retires whole generations in bulk once their records are reclaimable.
//!
//! The map holds one once-cell per generation. A `put-if-absent` under
//! the write lock guarantees a single cell per generation; the cell
//! itself guarantees the factory runs at most once even when racing
//! threads were handed the same cell. The factory therefore never runs
//! under the map lock.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::record::Generation;

/// Concurrent mapping from generation to a lazily materialized value,
/// constructed at most once per generation.
///
/// `V` is expected to be a cheap-to-clone handle (the concurrent cache
/// wrappers all are); `get_or_create` hands out clones.
pub struct GenerationIndex<V> {
    name: &'static str,
    entries: RwLock<FxHashMap<Generation, Arc<OnceLock<V>>>>,
    factory: Box<dyn Fn() -> V + Send + Sync>,
}

impl<V> GenerationIndex<V>
where
    V: Clone,
{
    /// Creates an index that materializes values with `factory`. `name`
    /// labels the index in logs.
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        Self {
            name,
            entries: RwLock::new(FxHashMap::default()),
            factory: Box::new(factory),
        }
    }

    /// Returns the value for `generation`, materializing it on first
    /// request. Concurrent callers for the same generation all observe
    /// the one instance the factory produced.
    pub fn get_or_create(&self, generation: Generation) -> V {
        // Bind the fast-path lookup so the read guard drops before the
        // write lock is taken.
        let existing = self.entries.read().get(&generation).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut entries = self.entries.write();
                Arc::clone(
                    entries
                        .entry(generation)
                        .or_insert_with(|| Arc::new(OnceLock::new())),
                )
            },
        };

        let mut created = false;
        let value = cell
            .get_or_init(|| {
                created = true;
                (self.factory)()
            })
            .clone();
        if created {
            debug!(cache = self.name, generation, "materialized cache generation");
        }
        value
    }

    /// Snapshot of the materialized values, in no particular order.
    ///
    /// A generation whose factory is still running is skipped; the next
    /// read observes it. Acceptable staleness for monitoring reads.
    pub fn values(&self) -> Vec<V> {
        self.entries
            .read()
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect()
    }

    /// Number of generations ever requested and not yet retired.
    pub fn generation_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Removes every entry whose generation satisfies `predicate`.
    ///
    /// Callers still holding a value for a retired generation keep a
    /// working cache; only future lookups re-materialize.
    pub fn retire<F>(&self, predicate: F)
    where
        F: Fn(Generation) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|&generation, _| !predicate(generation));
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            debug!(cache = self.name, removed, "retired cache generations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_index() -> (GenerationIndex<Arc<u64>>, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&invocations);
        let index = GenerationIndex::new("test", move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Arc::new(7u64)
        });
        (index, invocations)
    }

    #[test]
    fn factory_runs_once_per_generation() {
        let (index, invocations) = counting_index();

        let first = index.get_or_create(1);
        let again = index.get_or_create(1);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        index.get_or_create(2);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert_eq!(index.generation_count(), 2);
    }

    #[test]
    fn distinct_generations_get_distinct_values() {
        let (index, _) = counting_index();
        let one = index.get_or_create(1);
        let two = index.get_or_create(2);
        assert!(!Arc::ptr_eq(&one, &two));
    }

    #[test]
    fn retire_forces_fresh_materialization() {
        let (index, invocations) = counting_index();
        let retired = index.get_or_create(5);
        let kept = index.get_or_create(6);

        index.retire(|generation| generation == 5);
        assert_eq!(index.generation_count(), 1);

        // Retained generation keeps its instance.
        assert!(Arc::ptr_eq(&kept, &index.get_or_create(6)));

        // Retired generation is rebuilt from scratch.
        let rebuilt = index.get_or_create(5);
        assert!(!Arc::ptr_eq(&retired, &rebuilt));
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn values_lists_materialized_entries() {
        let (index, _) = counting_index();
        assert!(index.values().is_empty());

        index.get_or_create(1);
        index.get_or_create(2);
        assert_eq!(index.values().len(), 2);

        index.retire(|_| true);
        assert!(index.values().is_empty());
    }
}
