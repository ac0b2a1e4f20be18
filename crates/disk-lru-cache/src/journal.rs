//! Append-only journal of entry state transitions
//!
//! The journal starts with a five line header followed by one record per
//! line:
//!
//! ```text
//! io.github.swiftycache.DiskLRUCache
//! 1
//! 100
//! 2
//!
//! DIRTY k1
//! CLEAN k1 3 2
//! READ k1
//! REMOVE k1
//! ```
//!
//! Replaying the records in order rebuilds the entry index. Rewrites go
//! through `journal.tmp` and a `journal.bkp` swap so that a crash at any
//! point leaves a readable journal behind.

use crate::entry::{CacheEntry, REPLAY_EDITOR};
use crate::error::{CacheError, Result};
use crate::files;
use crate::index::LruIndex;
use crate::key::is_valid_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_FILE_TEMP: &str = "journal.tmp";
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

pub const MAGIC: &str = "io.github.swiftycache.DiskLRUCache";
pub const VERSION_1: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JournalRecord {
    Dirty(String),
    Clean(String, Vec<u64>),
    Remove(String),
    Read(String),
}

impl JournalRecord {
    pub fn parse(line: &str, value_count: usize) -> Result<Self> {
        let unexpected =
            || CacheError::MalformedJournal(format!("unexpected journal line: {}", line));

        let mut parts = line.split(' ');
        let status = parts.next().unwrap_or("");
        let key = parts
            .next()
            .filter(|k| is_valid_key(k))
            .ok_or_else(unexpected)?
            .to_string();
        let rest: Vec<&str> = parts.collect();

        match status {
            CLEAN => {
                if rest.len() != value_count {
                    return Err(CacheError::MalformedJournal(format!(
                        "unmatched length count: {}",
                        line
                    )));
                }
                let lengths = rest
                    .iter()
                    .map(|s| {
                        s.parse::<u64>().map_err(|_| {
                            CacheError::MalformedJournal(format!(
                                "bad integer {} in: {}",
                                s, line
                            ))
                        })
                    })
                    .collect::<Result<Vec<u64>>>()?;
                Ok(JournalRecord::Clean(key, lengths))
            }
            DIRTY if rest.is_empty() => Ok(JournalRecord::Dirty(key)),
            REMOVE if rest.is_empty() => Ok(JournalRecord::Remove(key)),
            READ if rest.is_empty() => Ok(JournalRecord::Read(key)),
            _ => Err(unexpected()),
        }
    }
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalRecord::Dirty(key) => write!(f, "{} {}", DIRTY, key),
            JournalRecord::Clean(key, lengths) => {
                write!(f, "{} {}", CLEAN, key)?;
                for len in lengths {
                    write!(f, " {}", len)?;
                }
                Ok(())
            }
            JournalRecord::Remove(key) => write!(f, "{} {}", REMOVE, key),
            JournalRecord::Read(key) => write!(f, "{} {}", READ, key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JournalHeader {
    pub app_version: u32,
    pub value_count: usize,
}

impl JournalHeader {
    fn lines(&self) -> [String; 5] {
        [
            MAGIC.to_string(),
            VERSION_1.to_string(),
            self.app_version.to_string(),
            self.value_count.to_string(),
            String::new(),
        ]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Locations of the live journal and its rewrite companions
#[derive(Debug, Clone)]
pub(crate) struct JournalPaths {
    pub journal: PathBuf,
    pub tmp: PathBuf,
    pub backup: PathBuf,
}

impl JournalPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            journal: dir.join(JOURNAL_FILE),
            tmp: dir.join(JOURNAL_FILE_TEMP),
            backup: dir.join(JOURNAL_FILE_BACKUP),
        }
    }
}

/// Records read back from a journal file
#[derive(Debug)]
pub(crate) struct JournalLog {
    pub records: Vec<JournalRecord>,
    /// The last line had no terminating newline
    pub truncated: bool,
}

pub(crate) async fn read_journal(path: &Path, header: &JournalHeader) -> Result<JournalLog> {
    let file = File::open(path)
        .await
        .map_err(|e| CacheError::io_with(format!("Failed to open journal: {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();

    for expected in header.lines() {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line.strip_suffix('\n') != Some(expected.as_str()) {
            return Err(CacheError::MalformedJournal(
                "bad journal file header".to_string(),
            ));
        }
    }

    let mut records = Vec::new();
    let mut truncated = false;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let text = match line.strip_suffix('\n') {
            Some(text) => text,
            None => {
                truncated = true;
                line.as_str()
            }
        };
        records.push(JournalRecord::parse(text, header.value_count)?);
    }

    Ok(JournalLog { records, truncated })
}

/// Apply one replayed record to the index the same way the live operation
/// left it.
pub(crate) fn apply_record(
    index: &mut LruIndex<CacheEntry>,
    record: JournalRecord,
    value_count: usize,
) {
    match record {
        JournalRecord::Remove(key) => {
            index.remove(&key);
        }
        JournalRecord::Clean(key, lengths) => {
            let entry = index.get_or_insert_with(&key, || CacheEntry::new(value_count));
            entry.readable = true;
            entry.active_editor = None;
            entry.lengths = lengths;
        }
        JournalRecord::Dirty(key) => {
            let entry = index.get_or_insert_with(&key, || CacheEntry::new(value_count));
            entry.active_editor = Some(REPLAY_EDITOR);
        }
        JournalRecord::Read(key) => {
            index.get_or_insert_with(&key, || CacheEntry::new(value_count));
        }
    }
}

/// Handle for appending records to the live journal
#[derive(Debug)]
pub(crate) struct JournalWriter {
    file: File,
}

impl JournalWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| CacheError::io_with(format!("Failed to open {}", path.display()), e))?;
        debug!(path = ?path, "Journal writer opened");
        Ok(Self { file })
    }

    pub async fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let line = format!("{}\n", record);
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

/// Replace the journal with one line per entry, in LRU order.
///
/// The caller must not hold a writer on the live journal.
pub(crate) async fn rewrite(
    paths: &JournalPaths,
    header: &JournalHeader,
    index: &LruIndex<CacheEntry>,
) -> Result<()> {
    let mut contents = header.render();
    for (key, entry) in index.iter() {
        let record = if entry.is_editing() {
            JournalRecord::Dirty(key.to_string())
        } else {
            JournalRecord::Clean(key.to_string(), entry.lengths.clone())
        };
        contents.push_str(&record.to_string());
        contents.push('\n');
    }

    let mut tmp = File::create(&paths.tmp).await.map_err(|e| {
        CacheError::io_with(
            format!("Failed to open temp journal file: {}", paths.tmp.display()),
            e,
        )
    })?;
    tmp.write_all(contents.as_bytes()).await?;
    tmp.sync_all().await?;
    drop(tmp);

    if files::exists(&paths.journal).await {
        files::rename(&paths.journal, &paths.backup, true).await?;
    }
    files::rename(&paths.tmp, &paths.journal, false).await?;
    files::delete_if_exists(&paths.backup).await?;

    info!(entries = index.len(), "Journal rewritten");
    Ok(())
}

/// Finish or undo an interrupted rewrite swap
pub(crate) async fn recover_backup(paths: &JournalPaths) -> Result<()> {
    if !files::exists(&paths.backup).await {
        return Ok(());
    }
    if files::exists(&paths.journal).await {
        files::delete_if_exists(&paths.backup).await?;
    } else {
        info!(path = ?paths.backup, "Restoring journal from backup");
        files::rename(&paths.backup, &paths.journal, false).await?;
    }
    Ok(())
}

/// Read-only summary of a cache directory's journal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalSummary {
    pub records: usize,
    pub readable_entries: usize,
    pub dirty_entries: usize,
    pub redundant_operations: usize,
    pub total_size: u64,
    pub truncated: bool,
    pub backup_present: bool,
}

/// Replay a journal without opening the cache or touching any file.
///
/// Falls back to `journal.bkp` when the live journal is missing, mirroring
/// what opening the cache would do.
pub async fn inspect_journal(
    dir: &Path,
    app_version: u32,
    value_count: usize,
) -> Result<JournalSummary> {
    let paths = JournalPaths::new(dir);
    let header = JournalHeader {
        app_version,
        value_count,
    };
    let backup_present = files::exists(&paths.backup).await;
    let source = if files::exists(&paths.journal).await || !backup_present {
        &paths.journal
    } else {
        &paths.backup
    };

    let log = read_journal(source, &header).await?;
    let records = log.records.len();
    let mut index = LruIndex::new();
    for record in log.records {
        apply_record(&mut index, record, value_count);
    }

    let mut summary = JournalSummary {
        records,
        redundant_operations: records.saturating_sub(index.len()),
        truncated: log.truncated,
        backup_present,
        ..Default::default()
    };
    for (_, entry) in index.iter() {
        if entry.is_editing() {
            summary.dirty_entries += 1;
        } else if entry.readable {
            summary.readable_entries += 1;
            summary.total_size += entry.total_len();
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: JournalHeader = JournalHeader {
        app_version: 100,
        value_count: 2,
    };

    #[test]
    fn test_parse_valid_records() {
        assert_eq!(
            JournalRecord::parse("CLEAN k1 1 1", 2).unwrap(),
            JournalRecord::Clean("k1".to_string(), vec![1, 1])
        );
        assert_eq!(
            JournalRecord::parse("CLEAN k1 0 2", 2).unwrap(),
            JournalRecord::Clean("k1".to_string(), vec![0, 2])
        );
        assert_eq!(
            JournalRecord::parse("DIRTY k1", 2).unwrap(),
            JournalRecord::Dirty("k1".to_string())
        );
        assert_eq!(
            JournalRecord::parse("REMOVE k1", 2).unwrap(),
            JournalRecord::Remove("k1".to_string())
        );
        assert_eq!(
            JournalRecord::parse("READ k1", 2).unwrap(),
            JournalRecord::Read("k1".to_string())
        );
    }

    #[test]
    fn test_parse_malformed_records() {
        for line in [
            "CLEAN  k1 1 1",
            "CLEAN k1 1 2 3",
            "CLEAN k1 1",
            "CLEAN k1 1k 1",
            "CLEAN k1 -1 1",
            "BADStatus k1 1 1",
            "BOGUS",
            "",
            "DIRTY k1 extra",
            "REMOVE k1 1",
            "READ",
            "CLEAN a/b 1 1",
        ] {
            let result = JournalRecord::parse(line, 2);
            assert!(
                matches!(result, Err(CacheError::MalformedJournal(_))),
                "'{}' should be malformed",
                line
            );
        }
    }

    #[test]
    fn test_record_display_round_trips_through_parse() {
        let record = JournalRecord::Clean("key1".to_string(), vec![3, 2]);
        assert_eq!(record.to_string(), "CLEAN key1 3 2");
        assert_eq!(JournalRecord::parse(&record.to_string(), 2).unwrap(), record);
    }

    #[test]
    fn test_header_render() {
        assert_eq!(
            HEADER.render(),
            "io.github.swiftycache.DiskLRUCache\n1\n100\n2\n\n"
        );
    }

    #[tokio::test]
    async fn test_read_journal_detects_truncated_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        tokio::fs::write(&path, format!("{}DIRTY k1\nCLEAN k1 1 1", HEADER.render()))
            .await
            .unwrap();

        let log = read_journal(&path, &HEADER).await.unwrap();
        assert!(log.truncated);
        assert_eq!(log.records.len(), 2);
        assert_eq!(
            log.records[1],
            JournalRecord::Clean("k1".to_string(), vec![1, 1])
        );
    }

    #[tokio::test]
    async fn test_read_journal_rejects_bad_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);

        for header in [
            format!("{}\n0\n100\n2\n\n", MAGIC),
            format!("{}\n1\n101\n2\n\n", MAGIC),
            format!("{}\n1\n100\n1\n\n", MAGIC),
            format!("{} \n1\n100\n2\n\n", MAGIC),
            format!("{}\n1\n100\n2\n \n", MAGIC),
            format!("{}\n1\n100\n2\n", MAGIC),
        ] {
            tokio::fs::write(&path, header).await.unwrap();
            let result = read_journal(&path, &HEADER).await;
            assert!(matches!(result, Err(CacheError::MalformedJournal(_))));
        }
    }

    #[test]
    fn test_apply_records_in_order() {
        let mut index = LruIndex::new();
        for line in [
            "DIRTY a",
            "CLEAN a 1 2",
            "DIRTY b",
            "CLEAN b 3 4",
            "READ a",
            "DIRTY c",
            "DIRTY d",
            "REMOVE d",
        ] {
            apply_record(&mut index, JournalRecord::parse(line, 2).unwrap(), 2);
        }

        assert_eq!(index.keys(), vec!["b", "a", "c"]);
        let a = index.peek("a").unwrap();
        assert!(a.readable);
        assert_eq!(a.lengths, vec![1, 2]);
        assert!(index.peek("c").unwrap().is_editing());
        assert!(!index.contains_key("d"));
    }

    #[tokio::test]
    async fn test_rewrite_swaps_in_new_journal() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path());
        tokio::fs::write(&paths.journal, format!("{}READ x\n", HEADER.render()))
            .await
            .unwrap();

        let mut index = LruIndex::new();
        let mut clean = CacheEntry::new(2);
        clean.readable = true;
        clean.lengths = vec![3, 2];
        index.insert("k1".to_string(), clean);
        let mut dirty = CacheEntry::new(2);
        dirty.active_editor = Some(REPLAY_EDITOR);
        index.insert("k2".to_string(), dirty);

        rewrite(&paths, &HEADER, &index).await.unwrap();

        let contents = tokio::fs::read_to_string(&paths.journal).await.unwrap();
        assert_eq!(
            contents,
            format!("{}CLEAN k1 3 2\nDIRTY k2\n", HEADER.render())
        );
        assert!(!files::exists(&paths.tmp).await);
        assert!(!files::exists(&paths.backup).await);
    }

    #[tokio::test]
    async fn test_recover_backup() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path());

        // Only the backup exists: it is promoted
        tokio::fs::write(&paths.backup, "backup").await.unwrap();
        recover_backup(&paths).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&paths.journal).await.unwrap(),
            "backup"
        );
        assert!(!files::exists(&paths.backup).await);

        // Both exist: the live journal wins
        tokio::fs::write(&paths.backup, "stale").await.unwrap();
        recover_backup(&paths).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&paths.journal).await.unwrap(),
            "backup"
        );
        assert!(!files::exists(&paths.backup).await);
    }

    #[tokio::test]
    async fn test_writer_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        tokio::fs::write(&path, HEADER.render()).await.unwrap();

        let mut writer = JournalWriter::open(&path).await.unwrap();
        writer
            .append(&JournalRecord::Dirty("k1".to_string()))
            .await
            .unwrap();
        writer
            .append(&JournalRecord::Clean("k1".to_string(), vec![3, 2]))
            .await
            .unwrap();
        writer.close().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            contents,
            format!("{}DIRTY k1\nCLEAN k1 3 2\n", HEADER.render())
        );
    }

    #[tokio::test]
    async fn test_inspect_journal_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        tokio::fs::write(
            &path,
            format!(
                "{}DIRTY a\nCLEAN a 1 3\nDIRTY b\nCLEAN b 2 4\nREAD a\nDIRTY c",
                HEADER.render()
            ),
        )
        .await
        .unwrap();

        let summary = inspect_journal(dir.path(), 100, 2).await.unwrap();
        assert_eq!(summary.records, 6);
        assert_eq!(summary.readable_entries, 2);
        assert_eq!(summary.dirty_entries, 1);
        assert_eq!(summary.redundant_operations, 3);
        assert_eq!(summary.total_size, 10);
        assert!(summary.truncated);
        assert!(!summary.backup_present);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"total_size\":10"));
    }
}
