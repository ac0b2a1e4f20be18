//! Journaled LRU disk cache
//!
//! Every operation runs under one FIFO lock, so journal writes, index updates
//! and file moves never interleave. Eviction and journal compaction run at
//! the end of the operation that made them necessary, before the lock is
//! released. A failure there is held back and returned by the next
//! operation instead of being lost.

use crate::config::CacheConfig;
use crate::editor::Editor;
use crate::entry::{CacheEntry, EditorId};
use crate::error::{CacheError, Result};
use crate::files;
use crate::index::LruIndex;
use crate::journal::{self, JournalHeader, JournalPaths, JournalRecord, JournalWriter};
use crate::key::validate_key;
use crate::snapshot::Snapshot;
use crate::types::CacheStats;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// A bounded cache of multi-field entries stored as files in one directory.
///
/// Handles are cheap to clone and share the same underlying state.
#[derive(Clone)]
pub struct DiskLruCache {
    state: Arc<Mutex<CacheState>>,
    dir: PathBuf,
    value_count: usize,
    max_size: u64,
}

impl DiskLruCache {
    /// Open the cache in `config.dir`, creating it if needed.
    ///
    /// A journal that cannot be read back (wrong header, corrupt record)
    /// makes the whole directory be discarded and an empty cache started.
    /// Only invalid configuration or a filesystem failure makes this fail.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let state = CacheState::open(&config).await?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            dir: config.dir,
            value_count: config.value_count,
            max_size: config.max_size,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Start an edit of `key`, creating the entry if it does not exist.
    ///
    /// Only one editor may be active per key. An editor that is dropped
    /// without `commit` or `abort` keeps the entry locked until the cache is
    /// closed.
    pub async fn edit(&self, key: &str) -> Result<Editor> {
        let mut state = lock_checked(&self.state).await?;
        let id = state.begin_edit(key).await?;
        Ok(Editor::new(
            Arc::clone(&self.state),
            key.to_string(),
            id,
            self.value_count,
        ))
    }

    /// Write every field of `key` and commit them as one version
    pub async fn put<V: AsRef<[u8]>>(&self, key: &str, values: &[V]) -> Result<()> {
        let mut state = lock_checked(&self.state).await?;
        let result = state.put(key, values).await;
        state.run_pending_cleanup().await;
        result
    }

    /// Overwrite some fields of `key`, keeping the others.
    ///
    /// Fails if `key` has never been committed, since the remaining fields
    /// would have no value.
    pub async fn put_partial<V: AsRef<[u8]>>(&self, key: &str, values: &[(usize, V)]) -> Result<()> {
        let mut state = lock_checked(&self.state).await?;
        let result = state.put_partial(key, values).await;
        state.run_pending_cleanup().await;
        result
    }

    /// Read the fields of `key` selected by `read_mask`.
    ///
    /// Returns `None` when the entry is absent, not yet committed, or one of
    /// its files has gone missing.
    pub async fn get(&self, key: &str, read_mask: &[bool]) -> Result<Option<Snapshot>> {
        let mut state = lock_checked(&self.state).await?;
        let result = state.get(key, read_mask).await;
        state.run_pending_cleanup().await;
        result
    }

    pub async fn get_all(&self, key: &str) -> Result<Option<Snapshot>> {
        let mask = vec![true; self.value_count];
        self.get(key, &mask).await
    }

    /// Remove `key`. Returns false if it was absent or is being edited.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut state = lock_checked(&self.state).await?;
        let result = state.remove_entry(key).await;
        state.run_pending_cleanup().await;
        result
    }

    /// Abort outstanding edits and release the journal. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        let mut state = lock_checked(&self.state).await?;
        state.close().await
    }

    /// Close the cache and delete its directory, foreign files included
    pub async fn delete(&self) -> Result<()> {
        let mut state = lock_checked(&self.state).await?;
        state.close().await?;
        files::remove_dir_all_if_exists(&self.dir)
            .await
            .map_err(|e| CacheError::io_with(format!("Failed to delete {}", self.dir.display()), e))?;
        info!(dir = ?self.dir, "Cache deleted");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.journal.is_none()
    }

    /// Aggregate byte size of all committed fields
    pub async fn size(&self) -> u64 {
        self.state.lock().await.size
    }

    pub async fn redundant_operation_count(&self) -> usize {
        self.state.lock().await.redundant_op_count
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats()
    }
}

/// Take the cache lock, surfacing a failure left behind by a previous cleanup
pub(crate) async fn lock_checked(state: &Mutex<CacheState>) -> Result<MutexGuard<'_, CacheState>> {
    let mut guard = state.lock().await;
    match guard.take_stashed_error() {
        Some(err) => Err(err),
        None => Ok(guard),
    }
}

pub(crate) struct CacheState {
    dir: PathBuf,
    paths: JournalPaths,
    header: JournalHeader,
    value_count: usize,
    max_size: u64,
    compact_threshold: usize,
    index: LruIndex<CacheEntry>,
    /// `None` once closed
    journal: Option<JournalWriter>,
    size: u64,
    redundant_op_count: usize,
    next_sequence_number: u64,
    next_editor_id: EditorId,
    cleanup_pending: bool,
    stashed_error: Option<CacheError>,
    hits: u64,
    misses: u64,
    last_rebuild: Option<DateTime<Utc>>,
}

impl CacheState {
    async fn open(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let mut state = Self {
            dir: config.dir.clone(),
            paths: JournalPaths::new(&config.dir),
            header: JournalHeader {
                app_version: config.app_version,
                value_count: config.value_count,
            },
            value_count: config.value_count,
            max_size: config.max_size,
            compact_threshold: config.compact_threshold,
            index: LruIndex::new(),
            journal: None,
            size: 0,
            redundant_op_count: 0,
            next_sequence_number: 0,
            next_editor_id: 1,
            cleanup_pending: false,
            stashed_error: None,
            hits: 0,
            misses: 0,
            last_rebuild: None,
        };

        state.create_dir().await?;

        match state.load().await {
            Ok(true) => {
                info!(
                    dir = ?state.dir,
                    entries = state.index.len(),
                    size = state.size,
                    "Cache opened"
                );
                return Ok(state);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(dir = ?state.dir, error = %e, "Cache journal unusable, starting empty");
                state.reset();
                files::remove_dir_all_if_exists(&state.dir).await.map_err(|e| {
                    CacheError::io_with(format!("Failed to clear {}", state.dir.display()), e)
                })?;
                state.create_dir().await?;
            }
        }

        state.rebuild_journal().await?;
        info!(dir = ?state.dir, "Empty cache opened");
        Ok(state)
    }

    async fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io_with(format!("Failed to create {}", self.dir.display()), e))
    }

    fn reset(&mut self) {
        self.journal = None;
        self.index.clear();
        self.size = 0;
        self.redundant_op_count = 0;
    }

    /// Restore the index from an existing journal. Returns false if there is
    /// none.
    async fn load(&mut self) -> Result<bool> {
        journal::recover_backup(&self.paths).await?;
        if !files::exists(&self.paths.journal).await {
            return Ok(false);
        }
        self.replay().await?;
        Ok(true)
    }

    async fn replay(&mut self) -> Result<()> {
        let log = journal::read_journal(&self.paths.journal, &self.header).await?;
        let records = log.records.len();
        for record in log.records {
            journal::apply_record(&mut self.index, record, self.value_count);
        }
        self.redundant_op_count = records.saturating_sub(self.index.len());
        debug!(records, entries = self.index.len(), "Journal replayed");

        if log.truncated {
            info!("Journal ends with a truncated line, rewriting");
            self.rebuild_journal().await?;
        } else {
            self.journal = Some(JournalWriter::open(&self.paths.journal).await?);
        }

        self.process_journal().await
    }

    /// Compute the initial size and drop entries left mid-edit by a crash
    async fn process_journal(&mut self) -> Result<()> {
        files::delete_if_exists(&self.paths.tmp).await?;

        for key in self.index.keys() {
            let editing = match self.index.peek(&key) {
                Some(entry) if entry.is_editing() => true,
                Some(entry) => {
                    self.size += entry.total_len();
                    false
                }
                None => false,
            };
            if editing {
                for i in 0..self.value_count {
                    files::delete_if_exists(&self.clean_path(&key, i)).await?;
                    files::delete_if_exists(&self.dirty_path(&key, i)).await?;
                }
                self.index.remove(&key);
                debug!(key = %key, "Dropped entry left mid-edit");
            }
        }
        Ok(())
    }

    /// Replace the journal with a compact one. If the rewrite fails before
    /// the swap, appending resumes on the old journal.
    async fn rebuild_journal(&mut self) -> Result<()> {
        if let Some(writer) = self.journal.take() {
            writer.close().await?;
        }

        let rewritten = journal::rewrite(&self.paths, &self.header, &self.index).await;
        if rewritten.is_ok() || files::exists(&self.paths.journal).await {
            self.journal = Some(JournalWriter::open(&self.paths.journal).await?);
        }
        rewritten?;

        self.last_rebuild = Some(Utc::now());
        Ok(())
    }

    fn rebuild_required(&self) -> bool {
        self.redundant_op_count >= self.compact_threshold
            && self.redundant_op_count >= self.index.len()
    }

    fn clean_path(&self, key: &str, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", key, index))
    }

    fn dirty_path(&self, key: &str, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.tmp", key, index))
    }

    fn check_open(&self) -> Result<()> {
        if self.journal.is_none() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    async fn append(&mut self, record: JournalRecord) -> Result<()> {
        self.journal
            .as_mut()
            .ok_or(CacheError::Closed)?
            .append(&record)
            .await
    }

    fn check_value_index(&self, index: usize) -> Result<()> {
        if index >= self.value_count {
            return Err(CacheError::IllegalState(format!(
                "Field index {} out of range, value count is {}",
                index, self.value_count
            )));
        }
        Ok(())
    }

    pub(crate) async fn begin_edit(&mut self, key: &str) -> Result<EditorId> {
        self.check_open()?;
        validate_key(key)?;

        let id = self.next_editor_id;
        let value_count = self.value_count;
        let entry = self
            .index
            .get_or_insert_with(key, || CacheEntry::new(value_count));
        if entry.is_editing() {
            return Err(CacheError::IllegalState(format!(
                "An edit is already in progress for key: {}",
                key
            )));
        }
        entry.active_editor = Some(id);
        self.next_editor_id += 1;

        if let Err(e) = self.append(JournalRecord::Dirty(key.to_string())).await {
            let readable = match self.index.peek_mut(key) {
                Some(entry) => {
                    entry.active_editor = None;
                    entry.readable
                }
                None => true,
            };
            if !readable {
                self.index.remove(key);
            }
            return Err(e);
        }

        debug!(key = %key, editor = id, "Edit started");
        Ok(id)
    }

    fn ensure_editor(&self, key: &str, id: EditorId) -> Result<()> {
        match self.index.peek(key) {
            Some(entry) if entry.active_editor == Some(id) => Ok(()),
            _ => Err(CacheError::IllegalState(format!(
                "Editor for key: {} is no longer active",
                key
            ))),
        }
    }

    async fn write_dirty(&self, key: &str, index: usize, value: &[u8]) -> std::io::Result<()> {
        fs::write(self.dirty_path(key, index), value).await
    }

    pub(crate) async fn write_field(
        &mut self,
        key: &str,
        id: EditorId,
        index: usize,
        value: &[u8],
    ) -> Result<()> {
        self.check_open()?;
        self.ensure_editor(key, id)?;
        self.check_value_index(index)?;
        self.write_dirty(key, index, value).await.map_err(|e| {
            CacheError::io_with(
                format!("Failed to set value for key:{} index:{}", key, index),
                e,
            )
        })
    }

    pub(crate) async fn commit_edit(
        &mut self,
        key: &str,
        id: EditorId,
        written: &[bool],
        has_errors: bool,
    ) -> Result<()> {
        self.check_open()?;
        self.ensure_editor(key, id)?;

        if has_errors {
            self.abort_and_remove(key).await?;
            return Err(CacheError::io(format!(
                "Edit of key:{} had failed writes and was discarded",
                key
            )));
        }

        let readable = self.index.peek(key).map(|e| e.readable).unwrap_or(false);
        if !readable {
            for i in 0..self.value_count {
                if !written.get(i).copied().unwrap_or(false) {
                    self.abort_and_remove(key).await?;
                    return Err(CacheError::IllegalState(format!(
                        "Newly created entry didn't create value for index: {}",
                        i
                    )));
                }
                if !files::exists(&self.dirty_path(key, i)).await {
                    warn!(key = %key, index = i, "Temp file missing at commit, discarding edit");
                    self.abort_and_remove(key).await?;
                    return Ok(());
                }
            }
        }

        if let Err(e) = self.finish_edit(key, true).await {
            if self.ensure_editor(key, id).is_ok() {
                self.discard_edit(key).await;
            }
            return Err(e);
        }
        Ok(())
    }

    pub(crate) async fn abort_edit(&mut self, key: &str, id: EditorId) -> Result<()> {
        self.check_open()?;
        self.ensure_editor(key, id)?;
        self.finish_edit(key, false).await
    }

    /// Release the active editor of `key`, publishing its temp files on
    /// success and deleting them otherwise.
    async fn finish_edit(&mut self, key: &str, success: bool) -> Result<()> {
        for i in 0..self.value_count {
            let dirty = self.dirty_path(key, i);
            if success {
                if files::exists(&dirty).await {
                    let clean = self.clean_path(key, i);
                    files::rename(&dirty, &clean, true).await.map_err(|e| {
                        CacheError::io_with(format!("Failed to publish {}", dirty.display()), e)
                    })?;
                    let new_len = files::file_len(&clean).await?;
                    if let Some(entry) = self.index.peek_mut(key) {
                        let old_len = entry.lengths[i];
                        entry.lengths[i] = new_len;
                        self.size = self.size.saturating_sub(old_len) + new_len;
                    }
                }
            } else {
                files::delete_if_exists(&dirty).await?;
            }
        }

        self.redundant_op_count += 1;
        let sequence_number = self.next_sequence_number;
        let record = match self.index.peek_mut(key) {
            Some(entry) => {
                entry.active_editor = None;
                if entry.readable || success {
                    entry.readable = true;
                    if success {
                        entry.sequence_number = sequence_number;
                    }
                    Some(JournalRecord::Clean(key.to_string(), entry.lengths.clone()))
                } else {
                    None
                }
            }
            None => {
                return Err(CacheError::IllegalState(format!(
                    "No entry for key: {}",
                    key
                )))
            }
        };

        let record = match record {
            Some(record) => {
                if success {
                    self.next_sequence_number += 1;
                    self.index.touch(key);
                }
                record
            }
            None => {
                self.index.remove(key);
                JournalRecord::Remove(key.to_string())
            }
        };
        self.append(record).await?;

        debug!(key = %key, success, size = self.size, "Edit completed");
        if self.size > self.max_size || self.rebuild_required() {
            self.cleanup_pending = true;
        }
        Ok(())
    }

    async fn abort_and_remove(&mut self, key: &str) -> Result<()> {
        self.finish_edit(key, false).await?;
        self.remove_entry(key).await?;
        Ok(())
    }

    /// Abort and remove after a failure that is already being reported
    async fn discard_edit(&mut self, key: &str) {
        if let Err(e) = self.abort_and_remove(key).await {
            warn!(key = %key, error = %e, "Failed to discard edit");
        }
    }

    async fn put<V: AsRef<[u8]>>(&mut self, key: &str, values: &[V]) -> Result<()> {
        self.check_open()?;
        validate_key(key)?;
        if values.len() != self.value_count {
            return Err(CacheError::IllegalState(format!(
                "Expected {} values, got {}",
                self.value_count,
                values.len()
            )));
        }

        let id = self.begin_edit(key).await?;
        let mut written = vec![false; self.value_count];
        for (i, value) in values.iter().enumerate() {
            if let Err(e) = self.write_dirty(key, i, value.as_ref()).await {
                self.discard_edit(key).await;
                return Err(CacheError::io_with(
                    format!("Failed to set value for key:{} index:{}", key, i),
                    e,
                ));
            }
            written[i] = true;
        }
        self.commit_edit(key, id, &written, false).await
    }

    async fn put_partial<V: AsRef<[u8]>>(&mut self, key: &str, values: &[(usize, V)]) -> Result<()> {
        self.check_open()?;
        validate_key(key)?;
        if values.len() > self.value_count {
            return Err(CacheError::IllegalState(format!(
                "Expected at most {} values, got {}",
                self.value_count,
                values.len()
            )));
        }
        for (index, _) in values {
            self.check_value_index(*index)?;
        }

        let id = self.begin_edit(key).await?;
        let mut written = vec![false; self.value_count];
        for (index, value) in values {
            if let Err(e) = self.write_dirty(key, *index, value.as_ref()).await {
                self.discard_edit(key).await;
                return Err(CacheError::io_with(
                    format!("Failed to set partial data for key:{} index:{}", key, index),
                    e,
                ));
            }
            written[*index] = true;
        }
        self.commit_edit(key, id, &written, false).await
    }

    async fn get(&mut self, key: &str, read_mask: &[bool]) -> Result<Option<Snapshot>> {
        self.check_open()?;
        validate_key(key)?;
        if read_mask.len() != self.value_count {
            return Err(CacheError::IllegalState(format!(
                "Read mask has {} flags, value count is {}",
                read_mask.len(),
                self.value_count
            )));
        }

        let (sequence_number, lengths) = match self.index.get(key) {
            Some(entry) if entry.readable => (entry.sequence_number, entry.lengths.clone()),
            _ => {
                self.misses += 1;
                return Ok(None);
            }
        };

        let mut values = Vec::with_capacity(self.value_count);
        for (i, &wanted) in read_mask.iter().enumerate() {
            if !wanted {
                values.push(None);
                continue;
            }
            match fs::read(self.clean_path(key, i)).await {
                Ok(data) => values.push(Some(data)),
                Err(e) => {
                    warn!(key = %key, index = i, error = %e, "Cached file unreadable, treating as miss");
                    self.misses += 1;
                    return Ok(None);
                }
            }
        }

        self.redundant_op_count += 1;
        self.append(JournalRecord::Read(key.to_string())).await?;
        if self.rebuild_required() {
            self.cleanup_pending = true;
        }

        self.hits += 1;
        debug!(key = %key, "Cache hit");
        Ok(Some(Snapshot::new(
            key.to_string(),
            sequence_number,
            values,
            lengths,
        )))
    }

    async fn remove_entry(&mut self, key: &str) -> Result<bool> {
        self.check_open()?;
        validate_key(key)?;

        match self.index.peek(key) {
            Some(entry) if !entry.is_editing() => {}
            _ => return Ok(false),
        }

        for i in 0..self.value_count {
            let clean = self.clean_path(key, i);
            files::delete_if_exists(&clean)
                .await
                .map_err(|e| CacheError::io_with(format!("Failed to delete {}", clean.display()), e))?;
            if let Some(entry) = self.index.peek_mut(key) {
                self.size = self.size.saturating_sub(entry.lengths[i]);
                entry.lengths[i] = 0;
            }
        }

        self.redundant_op_count += 1;
        self.append(JournalRecord::Remove(key.to_string())).await?;
        self.index.remove(key);

        debug!(key = %key, size = self.size, "Entry removed");
        if self.rebuild_required() {
            self.cleanup_pending = true;
        }
        Ok(true)
    }

    async fn trim_to_size(&mut self) -> Result<()> {
        while self.size > self.max_size {
            let key = match self.index.least_recently_used() {
                Some((_, entry)) if entry.is_editing() => {
                    debug!("Least recently used entry is being edited, eviction stalled");
                    break;
                }
                Some((key, _)) => key.to_string(),
                None => break,
            };
            if !self.remove_entry(&key).await? {
                break;
            }
            debug!(key = %key, size = self.size, "Evicted least recently used entry");
        }
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        if self.journal.is_none() {
            return Ok(());
        }
        self.trim_to_size().await?;
        if self.rebuild_required() {
            self.rebuild_journal().await?;
            self.redundant_op_count = 0;
        }
        Ok(())
    }

    pub(crate) fn take_stashed_error(&mut self) -> Option<CacheError> {
        let err = self.stashed_error.take()?;
        warn!(error = %err, "Reporting failure from a previous cleanup");
        Some(err)
    }

    /// Run eviction and compaction if the last operation asked for it
    pub(crate) async fn run_pending_cleanup(&mut self) {
        if !self.cleanup_pending {
            return;
        }
        let result = self.cleanup().await;
        self.cleanup_pending = false;
        if let Err(e) = result {
            error!(dir = ?self.dir, error = %e, "Cache cleanup failed");
            self.stashed_error = Some(e);
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.journal.is_none() {
            debug!(dir = ?self.dir, "Cache already closed");
            return Ok(());
        }

        let editing: Vec<String> = self
            .index
            .iter()
            .filter(|(_, entry)| entry.is_editing())
            .map(|(key, _)| key.to_string())
            .collect();
        for key in editing {
            warn!(key = %key, "Closing with an edit in progress, aborting it");
            self.finish_edit(&key, false).await?;
        }

        self.cleanup_pending = false;
        if let Some(writer) = self.journal.take() {
            writer.close().await?;
        }
        info!(dir = ?self.dir, entries = self.index.len(), "Cache closed");
        self.index.clear();
        self.size = 0;
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            size: self.size,
            max_size: self.max_size,
            redundant_operations: self.redundant_op_count,
            hits: self.hits,
            misses: self.misses,
            last_rebuild: self.last_rebuild,
        }
    }
}
