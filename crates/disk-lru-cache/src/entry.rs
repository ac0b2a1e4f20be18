//! Per-key entry state

/// Identifies the editor currently bound to an entry
pub(crate) type EditorId = u64;

/// Placeholder bound to entries found dirty while replaying the journal
pub(crate) const REPLAY_EDITOR: EditorId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheEntry {
    /// Byte length of each field's clean file
    pub lengths: Vec<u64>,
    /// True once the entry has completed a first commit
    pub readable: bool,
    /// The in-progress edit, if any
    pub active_editor: Option<EditorId>,
    /// Sequence number of the most recent successful commit
    pub sequence_number: u64,
}

impl CacheEntry {
    pub fn new(value_count: usize) -> Self {
        Self {
            lengths: vec![0; value_count],
            readable: false,
            active_editor: None,
            sequence_number: 0,
        }
    }

    pub fn total_len(&self) -> u64 {
        self.lengths.iter().sum()
    }

    pub fn is_editing(&self) -> bool {
        self.active_editor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_empty() {
        let entry = CacheEntry::new(3);
        assert_eq!(entry.lengths, vec![0, 0, 0]);
        assert!(!entry.readable);
        assert!(!entry.is_editing());
        assert_eq!(entry.total_len(), 0);
    }

    #[test]
    fn test_total_len() {
        let mut entry = CacheEntry::new(2);
        entry.lengths = vec![3, 12];
        assert_eq!(entry.total_len(), 15);
        entry.active_editor = Some(4);
        assert!(entry.is_editing());
    }
}
