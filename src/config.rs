//! Construction-time configuration of the cache manager.

use crate::error::ConfigError;

/// Default maximum entries per string-cache generation.
pub const DEFAULT_STRING_CACHE_SIZE: usize = 15_000;

/// Default maximum entries per template-cache generation.
pub const DEFAULT_TEMPLATE_CACHE_SIZE: usize = 3_000;

/// Default number of slots in the shared node deduplication table.
pub const DEFAULT_NODE_CACHE_SIZE: usize = 1 << 20;

/// Cache sizes applied when a [`CacheManager`] is built from
/// configuration. Hosts override the defaults at process start.
///
/// [`CacheManager`]: crate::manager::CacheManager
///
/// # Example
///
/// ```
/// use dedupkit::config::CacheManagerConfig;
///
/// let config = CacheManagerConfig {
///     string_cache_size: 1_000,
///     ..CacheManagerConfig::default()
/// };
/// assert_eq!(config.template_cache_size, 3_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Maximum entries per string-cache generation.
    pub string_cache_size: usize,
    /// Maximum entries per template-cache generation.
    pub template_cache_size: usize,
    /// Total slots in the shared node priority table. Must be zero or a
    /// power of two.
    pub node_cache_size: usize,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            string_cache_size: DEFAULT_STRING_CACHE_SIZE,
            template_cache_size: DEFAULT_TEMPLATE_CACHE_SIZE,
            node_cache_size: DEFAULT_NODE_CACHE_SIZE,
        }
    }
}

impl CacheManagerConfig {
    /// Checks the constraints a manager construction would enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_cache_size != 0 && !self.node_cache_size.is_power_of_two() {
            return Err(ConfigError::new(format!(
                "node_cache_size must be zero or a power of two, got {}",
                self.node_cache_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_sizes() {
        let config = CacheManagerConfig::default();
        assert_eq!(config.string_cache_size, 15_000);
        assert_eq!(config.template_cache_size, 3_000);
        assert_eq!(config.node_cache_size, 1_048_576);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_power_of_two_node_size_is_rejected() {
        let config = CacheManagerConfig {
            node_cache_size: 1_000_000,
            ..CacheManagerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("power of two"));
    }

    #[test]
    fn zero_node_size_is_legal() {
        let config = CacheManagerConfig {
            node_cache_size: 0,
            ..CacheManagerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
