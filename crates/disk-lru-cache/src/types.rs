//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Aggregate byte size of all committed fields
    pub size: u64,
    pub max_size: u64,
    /// Journal records beyond one per live entry
    pub redundant_operations: usize,
    pub hits: u64,
    pub misses: u64,
    /// When the journal was last rewritten from the in-memory index
    pub last_rebuild: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.redundant_operations, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(stats.last_rebuild.is_none());
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            size: 12345,
            max_size: 65536,
            redundant_operations: 7,
            hits: 10,
            misses: 2,
            last_rebuild: Some(Utc::now()),
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"size\":12345"));
        assert!(json.contains("redundant_operations"));

        let deserialized: CacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.entries, 3);
        assert_eq!(deserialized.max_size, 65536);
        assert_eq!(deserialized.last_rebuild, stats.last_rebuild);
    }
}
