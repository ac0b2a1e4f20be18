//! Cache construction parameters

use crate::error::{CacheError, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_COMPACT_THRESHOLD: usize = 2000;
const MIN_COMPACT_THRESHOLD: usize = 10;

/// Configuration for opening a [`crate::DiskLruCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory owned exclusively by the cache
    pub dir: PathBuf,
    /// Caller's format version; a mismatch with the journal starts a fresh cache
    pub app_version: u32,
    /// Number of fields per entry
    pub value_count: usize,
    /// Maximum aggregate size of all fields, in bytes
    pub max_size: u64,
    /// Redundant journal records tolerated before a rewrite is considered
    pub compact_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache/disk-lru"),
            app_version: 1,
            value_count: 2,
            max_size: 64 * 1024 * 1024, // 64MB
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>, app_version: u32, value_count: usize, max_size: u64) -> Self {
        Self {
            dir: dir.into(),
            app_version,
            value_count,
            max_size,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Parse configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.dir);

        let app_version = env::var("CACHE_APP_VERSION")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.app_version);

        let value_count = env::var("CACHE_VALUE_COUNT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.value_count);

        let max_size = env::var("MAX_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.max_size);

        let compact_threshold = env::var("CACHE_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.compact_threshold);

        Self {
            dir,
            app_version,
            value_count,
            max_size,
            compact_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.value_count == 0 {
            return Err(CacheError::Config(
                "value_count must be greater than 0".to_string(),
            ));
        }
        if self.max_size == 0 {
            return Err(CacheError::Config(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.compact_threshold <= MIN_COMPACT_THRESHOLD {
            return Err(CacheError::Config(format!(
                "compact_threshold must be greater than {}",
                MIN_COMPACT_THRESHOLD
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.dir, PathBuf::from("./cache/disk-lru"));
        assert_eq!(config.value_count, 2);
        assert_eq!(config.max_size, 64 * 1024 * 1024);
        assert_eq!(config.compact_threshold, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = CacheConfig::new("/tmp/c", 100, 3, 10)
            .with_max_size(20)
            .with_compact_threshold(200);
        assert_eq!(config.app_version, 100);
        assert_eq!(config.value_count, 3);
        assert_eq!(config.max_size, 20);
        assert_eq!(config.compact_threshold, 200);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = CacheConfig::new("/tmp/c", 1, 0, 10).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: value_count must be greater than 0"
        );

        assert!(CacheConfig::new("/tmp/c", 1, 2, 0).validate().is_err());
    }

    #[test]
    fn test_from_env() {
        let vars = [
            ("CACHE_DIR", "/tmp/env-cache"),
            ("CACHE_APP_VERSION", "7"),
            ("CACHE_VALUE_COUNT", "3"),
            ("MAX_CACHE_SIZE", "4096"),
            ("CACHE_COMPACT_THRESHOLD", "not-a-number"),
        ];
        for (name, value) in vars {
            env::set_var(name, value);
        }

        let config = CacheConfig::from_env();

        for (name, _) in vars {
            env::remove_var(name);
        }
        assert_eq!(config.dir, PathBuf::from("/tmp/env-cache"));
        assert_eq!(config.app_version, 7);
        assert_eq!(config.value_count, 3);
        assert_eq!(config.max_size, 4096);
        // Unparseable values fall back to the default
        assert_eq!(config.compact_threshold, DEFAULT_COMPACT_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_threshold() {
        let config = CacheConfig::new("/tmp/c", 1, 2, 10).with_compact_threshold(10);
        assert!(config.validate().is_err());

        let config = config.with_compact_threshold(11);
        assert!(config.validate().is_ok());
    }
}
