//! Convenience re-exports of the crate's main surface.

pub use crate::config::CacheManagerConfig;
pub use crate::error::{ConfigError, UnsupportedOperation};
pub use crate::generations::GenerationIndex;
pub use crate::manager::{
    CacheManager, NodeCacheHandle, NodeCacheView, StringCacheHandle, TemplateCacheHandle,
};
pub use crate::metrics::sink::{Counter, CounterSink, MemorySink, NoopSink};
pub use crate::metrics::snapshot::CacheStatsSnapshot;
pub use crate::priority_table::{ConcurrentPriorityTable, PriorityTable};
pub use crate::record::{Generation, Operation, RecordId, StableId, Template};
pub use crate::record_map::{ConcurrentRecordMap, RecordMap};
pub use crate::tracker::AccessTracker;
pub use crate::traits::{CacheStatsSource, DedupCache};
