//! disk-cache-inspect - summarize a disk-lru-cache directory
//!
//! Replays the journal without opening the cache, so nothing in the
//! directory is modified, and reports entry counts and sizes.

mod error;

use crate::error::Result;
use clap::Parser;
use disk_lru_cache::{inspect_journal, CacheConfig, JournalSummary};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "disk-cache-inspect")]
#[command(about = "Summarize the journal of a disk LRU cache directory")]
struct Cli {
    /// Cache directory
    #[arg(long, env = "CACHE_DIR")]
    dir: Option<PathBuf>,

    /// App version the cache was opened with
    #[arg(long, env = "CACHE_APP_VERSION")]
    app_version: Option<u32>,

    /// Number of fields per entry
    #[arg(long, env = "CACHE_VALUE_COUNT")]
    value_count: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Fill unset arguments from the environment, then the library defaults
    fn config(&self) -> CacheConfig {
        let defaults = CacheConfig::from_env();
        CacheConfig {
            dir: self.dir.clone().unwrap_or(defaults.dir),
            app_version: self.app_version.unwrap_or(defaults.app_version),
            value_count: self.value_count.unwrap_or(defaults.value_count),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::from_default_env().add_directive("disk_cache_inspect=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let cli = Cli::parse();
    let config = cli.config();
    info!(dir = ?config.dir, app_version = config.app_version, value_count = config.value_count, "Inspecting cache journal");

    let summary = inspect(&config).await?;
    println!("{}", render(&summary, cli.json)?);
    Ok(())
}

async fn inspect(config: &CacheConfig) -> Result<JournalSummary> {
    Ok(inspect_journal(&config.dir, config.app_version, config.value_count).await?)
}

fn render(summary: &JournalSummary, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(summary)?);
    }
    Ok(format!(
        "records: {}\nreadable entries: {}\ndirty entries: {}\nredundant operations: {}\ntotal size: {} bytes\ntruncated: {}\nbackup present: {}",
        summary.records,
        summary.readable_entries,
        summary.dirty_entries,
        summary.redundant_operations,
        summary.total_size,
        summary.truncated,
        summary.backup_present,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk_lru_cache::DiskLruCache;
    use tempfile::tempdir;

    #[test]
    fn test_cli_defaults_come_from_cache_config() {
        let cli = Cli::try_parse_from(["disk-cache-inspect"]).unwrap();
        let config = cli.config();
        let defaults = CacheConfig::default();
        assert_eq!(config.dir, defaults.dir);
        assert_eq!(config.value_count, defaults.value_count);
        assert!(!cli.json);
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from([
            "disk-cache-inspect",
            "--dir",
            "/tmp/cache",
            "--app-version",
            "100",
            "--value-count",
            "3",
            "--json",
        ])
        .unwrap();
        let config = cli.config();
        assert_eq!(config.dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.app_version, 100);
        assert_eq!(config.value_count, 3);
        assert!(cli.json);
    }

    #[test]
    fn test_render_text_and_json() {
        let summary = JournalSummary {
            records: 4,
            readable_entries: 1,
            total_size: 5,
            ..Default::default()
        };

        let text = render(&summary, false).unwrap();
        assert!(text.contains("records: 4"));
        assert!(text.contains("total size: 5 bytes"));

        let json = render(&summary, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["readable_entries"], 1);
    }

    #[tokio::test]
    async fn test_inspect_leaves_directory_untouched() {
        let root = tempdir().unwrap();
        let config = CacheConfig::new(root.path().join("cache"), 100, 2, 1024);
        let cache = DiskLruCache::open(config.clone()).await.unwrap();
        cache.put("a", &["abc", "de"]).await.unwrap();
        cache.put("b", &["f", "g"]).await.unwrap();
        cache.remove("b").await.unwrap();
        cache.close().await.unwrap();

        let journal = config.dir.join(disk_lru_cache::JOURNAL_FILE);
        let before = std::fs::read(&journal).unwrap();

        let summary = inspect(&config).await.unwrap();
        assert_eq!(summary.records, 5);
        assert_eq!(summary.readable_entries, 1);
        assert_eq!(summary.redundant_operations, 4);
        assert_eq!(summary.total_size, 5);
        assert!(!summary.truncated);

        assert_eq!(std::fs::read(&journal).unwrap(), before);
    }
}
