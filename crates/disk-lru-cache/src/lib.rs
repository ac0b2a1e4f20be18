//! Journaled, crash-safe LRU cache of multi-field entries on disk
//!
//! Each entry is addressed by a short key and holds a fixed number of byte
//! fields, each stored as its own file. An append-only journal records every
//! state change so the cache survives restarts and crashes; the total size of
//! all fields is bounded, with least recently used entries evicted first.
//!
//! # Example
//!
//! ```no_run
//! use disk_lru_cache::{CacheConfig, DiskLruCache};
//!
//! # async fn example() -> Result<(), disk_lru_cache::CacheError> {
//! let cache = DiskLruCache::open(CacheConfig::new("/var/cache/thumbs", 1, 2, 10 * 1024 * 1024)).await?;
//!
//! // Both fields of a new entry must be written
//! cache.put("thumb-42", &[&b"image bytes"[..], &b"image/jpeg"[..]]).await?;
//!
//! // Replace only the metadata field
//! cache.put_partial("thumb-42", &[(1, &b"image/png"[..])]).await?;
//!
//! if let Some(snapshot) = cache.get_all("thumb-42").await? {
//!     println!("{:?}", snapshot.string(1));
//! }
//!
//! // Streaming-style edits go through an editor
//! let mut editor = cache.edit("thumb-43").await?;
//! editor.write(0, b"other bytes").await?;
//! editor.write(1, b"image/webp").await?;
//! editor.commit().await?;
//!
//! cache.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! - `journal`: header plus `DIRTY`/`CLEAN`/`REMOVE`/`READ` records
//! - `journal.tmp`, `journal.bkp`: transient files of a journal rewrite
//! - `<key>.<i>`: committed field `i` of an entry
//! - `<key>.<i>.tmp`: field `i` staged by an in-progress edit

mod cache;
mod config;
mod editor;
mod entry;
mod error;
mod files;
mod index;
mod journal;
mod key;
mod snapshot;
mod types;

pub use cache::DiskLruCache;
pub use config::{CacheConfig, DEFAULT_COMPACT_THRESHOLD};
pub use editor::Editor;
pub use error::{CacheError, Result};
pub use index::LruIndex;
pub use journal::{inspect_journal, JournalSummary, JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP, MAGIC, VERSION_1};
pub use key::{hashed_key, is_valid_key, MAX_KEY_LEN};
pub use snapshot::Snapshot;
pub use types::CacheStats;
