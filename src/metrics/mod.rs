//! Telemetry primitives: counter sinks and stats snapshots.

pub mod sink;
pub mod snapshot;

pub use sink::{Counter, CounterSink, MemorySink, NoopSink};
pub use snapshot::CacheStatsSnapshot;
