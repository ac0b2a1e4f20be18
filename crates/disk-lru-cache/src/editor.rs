//! Exclusive write handle for one cache entry

use crate::cache::{lock_checked, CacheState};
use crate::entry::EditorId;
use crate::error::{CacheError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// An in-progress edit of one key, obtained from [`crate::DiskLruCache::edit`].
///
/// Field writes go to temp files and become visible only on [`Editor::commit`].
/// A new entry must have every field written before it can be committed;
/// an existing entry keeps the previous value of fields left untouched.
pub struct Editor {
    state: Arc<Mutex<CacheState>>,
    key: String,
    id: EditorId,
    written: Vec<bool>,
    has_errors: bool,
}

impl Editor {
    pub(crate) fn new(
        state: Arc<Mutex<CacheState>>,
        key: String,
        id: EditorId,
        value_count: usize,
    ) -> Self {
        Self {
            state,
            key,
            id,
            written: vec![false; value_count],
            has_errors: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stage the bytes of field `index`
    pub async fn write(&mut self, index: usize, value: impl AsRef<[u8]>) -> Result<()> {
        let mut state = lock_checked(&self.state).await?;
        match state
            .write_field(&self.key, self.id, index, value.as_ref())
            .await
        {
            Ok(()) => {
                if let Some(flag) = self.written.get_mut(index) {
                    *flag = true;
                }
                Ok(())
            }
            Err(e) => {
                if matches!(e, CacheError::Io { .. }) {
                    self.has_errors = true;
                }
                Err(e)
            }
        }
    }

    /// Publish the staged fields as the entry's new version.
    ///
    /// If a write failed earlier the edit is discarded instead, the entry is
    /// removed and an error is returned.
    ///
    /// The edit is completed even when a previous cleanup left a failure
    /// behind; that failure is returned afterwards.
    pub async fn commit(self) -> Result<()> {
        let mut state = self.state.lock().await;
        let stashed = state.take_stashed_error();
        let result = state
            .commit_edit(&self.key, self.id, &self.written, self.has_errors)
            .await;
        state.run_pending_cleanup().await;
        match stashed {
            Some(err) => Err(err),
            None => result,
        }
    }

    /// Drop the staged fields, leaving any previous version in place.
    ///
    /// Like [`Editor::commit`], this always releases the entry.
    pub async fn abort(self) -> Result<()> {
        let mut state = self.state.lock().await;
        let stashed = state.take_stashed_error();
        let result = state.abort_edit(&self.key, self.id).await;
        state.run_pending_cleanup().await;
        match stashed {
            Some(err) => Err(err),
            None => result,
        }
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("written", &self.written)
            .finish()
    }
}
