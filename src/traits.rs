//! Cache capability traits shared by the deduplication cache families.
//!
//! Two small traits split the surface the way the cache families differ:
//!
//! - [`DedupCache`]: the operations a writer performs through a cache
//!   handle (`get`, `put`, `put_weighted`). Record maps support the bare
//!   `put`; the node cache requires the weighted form. The form a family
//!   does not support returns [`UnsupportedOperation`]: the contract
//!   distinguishes "unsupported shape" from "unpopulated".
//! - [`CacheStatsSource`]: the monitoring surface (`size`, `weight`,
//!   `stats`) used for aggregation across generations.
//!
//! Handles returned by the manager ([`AccessTracker`]) implement
//! [`DedupCache`] by delegation, adding access/miss accounting on `get`.
//!
//! [`AccessTracker`]: crate::tracker::AccessTracker
//! [`UnsupportedOperation`]: crate::error::UnsupportedOperation

use crate::error::UnsupportedOperation;
use crate::metrics::snapshot::CacheStatsSnapshot;
use crate::record::RecordId;

/// Operations a writer performs through a deduplication cache handle.
///
/// Implementations are internally synchronized; all methods take `&self`
/// so handles can be shared across writer threads.
pub trait DedupCache<K> {
    /// Returns the locator previously stored under `key`, if any.
    fn get(&self, key: &K) -> Option<RecordId>;

    /// Stores `key → value` without an admission cost.
    ///
    /// Returns [`UnsupportedOperation`] on caches whose admission policy
    /// requires a cost (the node cache).
    fn put(&self, key: K, value: RecordId) -> Result<(), UnsupportedOperation>;

    /// Stores `key → value` with an admission `cost`.
    ///
    /// Returns [`UnsupportedOperation`] on caches that do not weigh
    /// entries (string and template record maps).
    fn put_weighted(&self, key: K, value: RecordId, cost: u8) -> Result<(), UnsupportedOperation>;
}

/// Read-only monitoring surface of a cache.
pub trait CacheStatsSource {
    /// Number of entries currently cached.
    fn size(&self) -> u64;

    /// Approximate memory weight of the cached entries, in bytes.
    fn weight(&self) -> u64;

    /// Snapshot of the cache's counters plus current size and weight.
    fn stats(&self) -> CacheStatsSnapshot;
}
