//! Top-level deduplication cache manager.
//!
//! The [`CacheManager`] owns the caches the segment writer consults
//! before persisting a record: per-generation record maps for strings and
//! templates, and one shared priority table for nodes. Writers request a
//! handle per `(generation, operation)`; every handle is an
//! [`AccessTracker`] reporting accesses and misses under
//! `<family>-deduplication-cache-<operation>`.
//!
//! Compaction drives the other half of the lifecycle: once records of a
//! generation become reclaimable, [`CacheManager::retire`] drops every
//! cache entry of the matching generations so no writer can reuse them.
//!
//! # Example
//!
//! ```
//! use dedupkit::manager::CacheManager;
//! use dedupkit::record::{Operation, RecordId};
//! use dedupkit::traits::DedupCache;
//!
//! let manager = CacheManager::new();
//! let cache = manager.string_cache(5, Operation::Write);
//! cache.put("shared".to_string(), RecordId::new(1, 64)).unwrap();
//! assert_eq!(cache.get(&"shared".to_string()), Some(RecordId::new(1, 64)));
//!
//! // A different generation never sees the entry.
//! let next = manager.string_cache(6, Operation::Write);
//! assert_eq!(next.get(&"shared".to_string()), None);
//! ```

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::{
    CacheManagerConfig, DEFAULT_NODE_CACHE_SIZE, DEFAULT_STRING_CACHE_SIZE,
    DEFAULT_TEMPLATE_CACHE_SIZE,
};
use crate::error::{ConfigError, UnsupportedOperation};
use crate::generations::GenerationIndex;
use crate::metrics::sink::{CounterSink, NoopSink};
use crate::metrics::snapshot::CacheStatsSnapshot;
use crate::priority_table::ConcurrentPriorityTable;
use crate::record::{Generation, Operation, RecordId, StableId, Template};
use crate::record_map::ConcurrentRecordMap;
use crate::tracker::AccessTracker;
use crate::traits::{CacheStatsSource, DedupCache};

/// Handle for string deduplication in one generation.
pub type StringCacheHandle = AccessTracker<ConcurrentRecordMap<String>>;

/// Handle for template deduplication in one generation.
pub type TemplateCacheHandle = AccessTracker<ConcurrentRecordMap<Template>>;

/// Handle for node deduplication in one generation.
pub type NodeCacheHandle = AccessTracker<NodeCacheView>;

/// The shared node table, built on first use.
///
/// The once-cell keeps construction at most once even when several writer
/// threads request node caches simultaneously; the default table is a
/// million slots, so nothing is allocated until somebody needs it.
struct LazyNodeTable {
    cell: OnceLock<ConcurrentPriorityTable<StableId>>,
    factory: Box<dyn Fn() -> ConcurrentPriorityTable<StableId> + Send + Sync>,
}

impl LazyNodeTable {
    fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ConcurrentPriorityTable<StableId> + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            factory: Box::new(factory),
        }
    }

    fn table(&self) -> &ConcurrentPriorityTable<StableId> {
        let mut created = false;
        let table = self.cell.get_or_init(|| {
            created = true;
            (self.factory)()
        });
        if created {
            debug!(capacity = table.capacity(), "materialized node deduplication table");
        }
        table
    }

    fn materialized(&self) -> Option<&ConcurrentPriorityTable<StableId>> {
        self.cell.get()
    }
}

/// View binding one generation onto the shared node table.
///
/// The node cache only admits entries with an explicit cost, so the bare
/// `put` signals [`UnsupportedOperation`]. That holds on the empty
/// manager too, where the table is merely unpopulated but the shape is
/// the same.
pub struct NodeCacheView {
    table: ConcurrentPriorityTable<StableId>,
    generation: Generation,
}

impl NodeCacheView {
    /// Returns the generation this view is bound to.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl DedupCache<StableId> for NodeCacheView {
    fn get(&self, key: &StableId) -> Option<RecordId> {
        self.table.get(key, self.generation)
    }

    fn put(&self, _key: StableId, _value: RecordId) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::new(
            "node cache entries require an admission cost; use put_weighted(key, value, cost)",
        ))
    }

    fn put_weighted(
        &self,
        key: StableId,
        value: RecordId,
        cost: u8,
    ) -> Result<(), UnsupportedOperation> {
        self.table.put(key, value, self.generation, cost);
        Ok(())
    }
}

/// Manages the deduplication caches used by the segment writer to avoid
/// persisting multiple copies of the same record.
///
/// The caches are striped into generations, one per compaction cycle,
/// which keeps records of reclaimable generations from being reused.
/// String and template caches materialize lazily per generation; the node
/// cache is one table shared by all generations, scoped per lookup.
pub struct CacheManager {
    strings: GenerationIndex<ConcurrentRecordMap<String>>,
    templates: GenerationIndex<ConcurrentRecordMap<Template>>,
    nodes: LazyNodeTable,
    sink: Arc<dyn CounterSink>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Creates a manager with the default cache sizes and no telemetry
    /// sink.
    pub fn new() -> Self {
        Self::with_factories(
            || ConcurrentRecordMap::new(DEFAULT_STRING_CACHE_SIZE),
            || ConcurrentRecordMap::new(DEFAULT_TEMPLATE_CACHE_SIZE),
            || ConcurrentPriorityTable::new(DEFAULT_NODE_CACHE_SIZE),
            Arc::new(NoopSink),
        )
    }

    /// Creates a manager from host-supplied sizes, reporting telemetry
    /// through `sink`.
    pub fn with_config(
        config: CacheManagerConfig,
        sink: Arc<dyn CounterSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let CacheManagerConfig {
            string_cache_size,
            template_cache_size,
            node_cache_size,
        } = config;
        Ok(Self::with_factories(
            move || ConcurrentRecordMap::new(string_cache_size),
            move || ConcurrentRecordMap::new(template_cache_size),
            move || ConcurrentPriorityTable::new(node_cache_size),
            sink,
        ))
    }

    /// Creates a manager from cache factories.
    ///
    /// Each factory is invoked exactly once per cache instance: the
    /// string and template factories once per generation on first
    /// request, the node factory once on first node-cache use.
    pub fn with_factories<SF, TF, NF>(
        string_factory: SF,
        template_factory: TF,
        node_factory: NF,
        sink: Arc<dyn CounterSink>,
    ) -> Self
    where
        SF: Fn() -> ConcurrentRecordMap<String> + Send + Sync + 'static,
        TF: Fn() -> ConcurrentRecordMap<Template> + Send + Sync + 'static,
        NF: Fn() -> ConcurrentPriorityTable<StableId> + Send + Sync + 'static,
    {
        Self {
            strings: GenerationIndex::new("strings", string_factory),
            templates: GenerationIndex::new("templates", template_factory),
            nodes: LazyNodeTable::new(node_factory),
            sink,
        }
    }

    /// Creates a manager whose caches hold nothing: every lookup misses
    /// and every insert is dropped. The node cache still rejects the bare
    /// `put`; the shape stays unsupported, not just unpopulated.
    pub fn empty() -> Self {
        Self::with_factories(
            || ConcurrentRecordMap::new(0),
            || ConcurrentRecordMap::new(0),
            || ConcurrentPriorityTable::new(0),
            Arc::new(NoopSink),
        )
    }

    /// Returns the string cache of `generation`, tracked for `operation`.
    pub fn string_cache(&self, generation: Generation, operation: Operation) -> StringCacheHandle {
        AccessTracker::new(
            &format!("string-deduplication-cache-{operation}"),
            self.strings.get_or_create(generation),
            self.sink.as_ref(),
        )
    }

    /// Returns the template cache of `generation`, tracked for
    /// `operation`.
    pub fn template_cache(
        &self,
        generation: Generation,
        operation: Operation,
    ) -> TemplateCacheHandle {
        AccessTracker::new(
            &format!("template-deduplication-cache-{operation}"),
            self.templates.get_or_create(generation),
            self.sink.as_ref(),
        )
    }

    /// Returns a node cache view bound to `generation`, tracked for
    /// `operation`. All generations share one table underneath.
    pub fn node_cache(&self, generation: Generation, operation: Operation) -> NodeCacheHandle {
        AccessTracker::new(
            &format!("node-deduplication-cache-{operation}"),
            NodeCacheView {
                table: self.nodes.table().clone(),
                generation,
            },
            self.sink.as_ref(),
        )
    }

    /// Drops every cache entry whose generation satisfies `predicate`.
    ///
    /// String and template generations are removed wholesale; matching
    /// node-table slots are cleared in place. Writers still holding a
    /// handle for a retired generation keep a working cache; only future
    /// lookups re-materialize.
    pub fn retire<F>(&self, predicate: F)
    where
        F: Fn(Generation) -> bool,
    {
        self.strings.retire(&predicate);
        self.templates.retire(&predicate);
        if let Some(table) = self.nodes.materialized() {
            let cleared = table.retire(&predicate);
            debug!(cleared, "retired node deduplication entries");
        }
    }

    /// Aggregated statistics over all materialized string-cache
    /// generations.
    pub fn string_stats(&self) -> CacheStatsSnapshot {
        accumulate(self.strings.values())
    }

    /// Aggregated statistics over all materialized template-cache
    /// generations.
    pub fn template_stats(&self) -> CacheStatsSnapshot {
        accumulate(self.templates.values())
    }

    /// Statistics of the shared node table; all zero while the table has
    /// not been materialized.
    pub fn node_stats(&self) -> CacheStatsSnapshot {
        self.nodes
            .materialized()
            .map(|table| table.stats())
            .unwrap_or_default()
    }

    /// Occupancy of the node table bucketed by priority, or `None` while
    /// the table has not been materialized.
    pub fn node_occupancy(&self) -> Option<String> {
        self.nodes
            .materialized()
            .map(|table| table.occupancy_summary())
    }
}

fn accumulate<K>(maps: Vec<ConcurrentRecordMap<K>>) -> CacheStatsSnapshot
where
    K: Eq + std::hash::Hash + Clone,
{
    maps.into_iter()
        .fold(CacheStatsSnapshot::default(), |acc, map| {
            acc.merge(map.stats())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sink::MemorySink;

    fn rid(n: u32) -> RecordId {
        RecordId::new(n as u128, n)
    }

    fn sid(n: u8) -> StableId {
        StableId::from_bytes([n; StableId::LEN])
    }

    fn small_manager(sink: Arc<dyn CounterSink>) -> CacheManager {
        CacheManager::with_config(
            CacheManagerConfig {
                string_cache_size: 8,
                template_cache_size: 8,
                node_cache_size: 64,
            },
            sink,
        )
        .unwrap()
    }

    #[test]
    fn node_view_binds_generation_onto_shared_table() {
        let manager = small_manager(Arc::new(NoopSink));

        let writer = manager.node_cache(1, Operation::Write);
        writer.put_weighted(sid(1), rid(1), 10).unwrap();

        // The compaction handle of the same generation shares the table.
        let compactor = manager.node_cache(1, Operation::Compact);
        assert_eq!(compactor.get(&sid(1)), Some(rid(1)));

        // Another generation never observes the entry.
        let other = manager.node_cache(2, Operation::Write);
        assert_eq!(other.get(&sid(1)), None);
    }

    #[test]
    fn bare_put_on_node_cache_is_unsupported() {
        let manager = small_manager(Arc::new(NoopSink));
        let nodes = manager.node_cache(0, Operation::Write);

        let err = nodes.put(sid(1), rid(1)).unwrap_err();
        assert!(err.message().contains("cost"));
        nodes.put_weighted(sid(1), rid(1), 1).unwrap();
        assert_eq!(nodes.get(&sid(1)), Some(rid(1)));
    }

    #[test]
    fn weighted_put_on_record_caches_is_unsupported() {
        let manager = small_manager(Arc::new(NoopSink));

        let strings = manager.string_cache(0, Operation::Write);
        assert!(strings.put_weighted("s".to_string(), rid(1), 1).is_err());

        let templates = manager.template_cache(0, Operation::Write);
        assert!(templates
            .put_weighted(Template::default(), rid(1), 1)
            .is_err());
        templates.put(Template::default(), rid(2)).unwrap();
        assert_eq!(templates.get(&Template::default()), Some(rid(2)));
    }

    #[test]
    fn empty_manager_caches_nothing_but_keeps_the_contract() {
        let manager = CacheManager::empty();

        let strings = manager.string_cache(1, Operation::Write);
        strings.put("x".to_string(), rid(1)).unwrap();
        assert_eq!(strings.get(&"x".to_string()), None);

        let templates = manager.template_cache(1, Operation::Compact);
        templates.put(Template::default(), rid(2)).unwrap();
        assert_eq!(templates.get(&Template::default()), None);

        let nodes = manager.node_cache(1, Operation::Write);
        assert!(nodes.put(sid(1), rid(3)).is_err());
        nodes.put_weighted(sid(1), rid(3), 255).unwrap();
        assert_eq!(nodes.get(&sid(1)), None);
    }

    #[test]
    fn telemetry_names_carry_family_and_operation() {
        let sink = Arc::new(MemorySink::new());
        let manager = small_manager(sink.clone());

        manager.string_cache(1, Operation::Compact).get(&"x".to_string());
        manager.node_cache(1, Operation::Write).get(&sid(1));

        assert_eq!(
            sink.value("string-deduplication-cache-compact.access-count"),
            1
        );
        assert_eq!(
            sink.value("string-deduplication-cache-compact.miss-count"),
            1
        );
        assert_eq!(sink.value("node-deduplication-cache-write.access-count"), 1);
        assert_eq!(sink.value("node-deduplication-cache-write.miss-count"), 1);
    }

    #[test]
    fn family_stats_aggregate_across_generations() {
        let manager = small_manager(Arc::new(NoopSink));

        let g1 = manager.string_cache(1, Operation::Write);
        g1.put("a".to_string(), rid(1)).unwrap();
        g1.put("b".to_string(), rid(2)).unwrap();
        let g2 = manager.string_cache(2, Operation::Write);
        g2.put("a".to_string(), rid(3)).unwrap();
        g2.get(&"a".to_string());

        let stats = manager.string_stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.loads, 3);
        assert_eq!(stats.hits, 1);
        assert!(stats.weight > 0);

        // Templates were never touched.
        assert_eq!(manager.template_stats(), CacheStatsSnapshot::default());
    }

    #[test]
    fn node_occupancy_is_lazy() {
        let manager = small_manager(Arc::new(NoopSink));
        assert_eq!(manager.node_occupancy(), None);
        assert_eq!(manager.node_stats(), CacheStatsSnapshot::default());

        let nodes = manager.node_cache(1, Operation::Write);
        let summary = manager.node_occupancy().unwrap();
        assert!(summary.starts_with("size 0/64"));

        nodes.put_weighted(sid(1), rid(1), 9).unwrap();
        let summary = manager.node_occupancy().unwrap();
        assert!(summary.starts_with("size 1/64"));
        assert!(summary.contains("[9: 1 occupied, 0 evicted]"));
        assert_eq!(manager.node_stats().size, 1);
    }

    #[test]
    fn retire_forwards_to_every_family() {
        let manager = small_manager(Arc::new(NoopSink));

        manager
            .string_cache(1, Operation::Write)
            .put("s".to_string(), rid(1))
            .unwrap();
        manager
            .string_cache(2, Operation::Write)
            .put("s".to_string(), rid(2))
            .unwrap();
        manager
            .node_cache(1, Operation::Write)
            .put_weighted(sid(1), rid(3), 5)
            .unwrap();

        manager.retire(|generation| generation == 1);

        assert_eq!(
            manager.string_cache(1, Operation::Write).get(&"s".to_string()),
            None
        );
        assert_eq!(
            manager.string_cache(2, Operation::Write).get(&"s".to_string()),
            Some(rid(2))
        );
        assert_eq!(manager.node_cache(1, Operation::Write).get(&sid(1)), None);
    }

    #[test]
    fn retire_skips_an_unmaterialized_node_table() {
        let manager = small_manager(Arc::new(NoopSink));
        manager.retire(|_| true);
        assert_eq!(manager.node_occupancy(), None);
    }

    #[test]
    fn invalid_node_size_is_rejected() {
        let result = CacheManager::with_config(
            CacheManagerConfig {
                node_cache_size: 12,
                ..CacheManagerConfig::default()
            },
            Arc::new(NoopSink),
        );
        assert!(result.is_err());
    }
}
