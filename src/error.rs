//! Error types for the dedupkit library.
//!
//! ## Key Components
//!
//! - [`UnsupportedOperation`]: Returned when a caller invokes a cache
//!   operation the cache's shape does not support (e.g. the bare `put`
//!   on a node cache, which requires an admission cost). This reports an
//!   API-contract violation, not a runtime condition.
//! - [`ConfigError`]: Returned when cache configuration parameters are
//!   invalid (e.g. a node table capacity that is not a power of two).
//!
//! A priority-table insert that finds no admissible slot is *not* an
//! error: the entry is silently dropped and `put` returns normally.

use std::fmt;

// ---------------------------------------------------------------------------
// UnsupportedOperation
// ---------------------------------------------------------------------------

/// Error returned when an operation is not supported by a cache's shape.
///
/// The node deduplication cache only admits entries with an explicit cost,
/// so its bare `put` signals this error; record maps conversely reject the
/// weighted form. Carries a human-readable description of the mismatch.
///
/// # Example
///
/// ```
/// use dedupkit::manager::CacheManager;
/// use dedupkit::record::{Operation, RecordId, StableId};
/// use dedupkit::traits::DedupCache;
///
/// let manager = CacheManager::new();
/// let nodes = manager.node_cache(0, Operation::Write);
/// let err = nodes
///     .put(StableId::from_bytes([0; 20]), RecordId::new(1, 0))
///     .unwrap_err();
/// assert!(err.to_string().contains("cost"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedOperation(String);

impl UnsupportedOperation {
    /// Creates a new `UnsupportedOperation` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnsupportedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UnsupportedOperation {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`ConcurrentPriorityTable::try_new`](crate::priority_table::ConcurrentPriorityTable::try_new)
/// and [`CacheManager::with_config`](crate::manager::CacheManager::with_config).
/// Carries a human-readable description of which parameter failed
/// validation.
///
/// # Example
///
/// ```
/// use dedupkit::priority_table::ConcurrentPriorityTable;
///
/// let err = ConcurrentPriorityTable::<u64>::try_new(1000).unwrap_err();
/// assert!(err.to_string().contains("power of two"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
