//! Access accounting wrapper around a cache handle.
//!
//! Every cache handle the manager hands out is wrapped in an
//! [`AccessTracker`]: each `get` increments `<name>.access-count`, and
//! additionally `<name>.miss-count` when the lookup came back empty.
//! Puts pass through untouched. The tracker holds no state beyond the
//! two counter handles.

use crate::error::UnsupportedOperation;
use crate::metrics::sink::{Counter, CounterSink};
use crate::record::RecordId;
use crate::traits::DedupCache;

/// Wraps a cache and counts read accesses and misses against a named
/// counter pair obtained from a [`CounterSink`].
pub struct AccessTracker<C> {
    inner: C,
    access_count: Counter,
    miss_count: Counter,
}

impl<C> AccessTracker<C> {
    /// Wraps `inner`, registering `<name>.access-count` and
    /// `<name>.miss-count` with the sink.
    pub fn new(name: &str, inner: C, sink: &dyn CounterSink) -> Self {
        Self {
            inner,
            access_count: sink.counter(&format!("{name}.access-count")),
            miss_count: sink.counter(&format!("{name}.miss-count")),
        }
    }

    /// Returns the wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<K, C> DedupCache<K> for AccessTracker<C>
where
    C: DedupCache<K>,
{
    fn get(&self, key: &K) -> Option<RecordId> {
        let value = self.inner.get(key);
        self.access_count.inc();
        if value.is_none() {
            self.miss_count.inc();
        }
        value
    }

    fn put(&self, key: K, value: RecordId) -> Result<(), UnsupportedOperation> {
        self.inner.put(key, value)
    }

    fn put_weighted(&self, key: K, value: RecordId, cost: u8) -> Result<(), UnsupportedOperation> {
        self.inner.put_weighted(key, value, cost)
    }
}
