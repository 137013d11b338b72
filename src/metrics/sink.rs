//! Named counter handles backing the access-tracking telemetry.
//!
//! The manager reports cache accesses against counters obtained from a
//! [`CounterSink`] by name (`<family>-deduplication-cache-<op>.access-count`
//! and `.miss-count`). Hosts plug in their monitoring backend by
//! implementing the sink; [`NoopSink`] discards everything and
//! [`MemorySink`] keeps a readable registry for tests and embedded use.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A shared monotonic counter.
///
/// Cloning yields a handle to the same underlying value. Increments are
/// relaxed; counters are observational and do not order other memory.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by one.
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Source of named counters.
///
/// Requesting the same name twice must return handles to the same
/// underlying counter (or counters indistinguishable from it).
pub trait CounterSink: Send + Sync {
    /// Returns the counter registered under `name`, creating it if needed.
    fn counter(&self, name: &str) -> Counter;
}

/// Sink that registers nothing.
///
/// Counters handed out still work but are not retained, so their values
/// are unobservable. Default sink for managers that do not report
/// telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CounterSink for NoopSink {
    fn counter(&self, _name: &str) -> Counter {
        Counter::new()
    }
}

/// Sink keeping an in-memory registry readable by name.
///
/// # Example
///
/// ```
/// use dedupkit::metrics::sink::{CounterSink, MemorySink};
///
/// let sink = MemorySink::new();
/// sink.counter("demo.access-count").inc();
/// sink.counter("demo.access-count").inc();
/// assert_eq!(sink.value("demo.access-count"), 2);
/// assert_eq!(sink.value("unknown"), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    counters: RwLock<FxHashMap<String, Counter>>,
}

impl MemorySink {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of the counter registered under `name`,
    /// or zero if no such counter exists.
    pub fn value(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(Counter::get)
            .unwrap_or(0)
    }

    /// Returns the registered counter names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.counters.read().keys().cloned().collect()
    }
}

impl CounterSink for MemorySink {
    fn counter(&self, name: &str) -> Counter {
        if let Some(counter) = self.counters.read().get(name) {
            return counter.clone();
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
