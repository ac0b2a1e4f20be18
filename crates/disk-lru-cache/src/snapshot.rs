//! Detached reads of cache entries

/// The values of a cache entry at the moment it was read.
///
/// Field bytes are copied into memory, so a snapshot stays valid after the
/// entry is overwritten, removed or evicted. Fields that were not requested
/// in the read mask are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key: String,
    sequence_number: u64,
    values: Vec<Option<Vec<u8>>>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        key: String,
        sequence_number: u64,
        values: Vec<Option<Vec<u8>>>,
        lengths: Vec<u64>,
    ) -> Self {
        Self {
            key,
            sequence_number,
            values,
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sequence number of the commit this snapshot was read from
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Bytes of field `index`, or `None` if that field was not read
    pub fn value(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index)?.as_deref()
    }

    /// Field `index` decoded as UTF-8
    pub fn string(&self, index: usize) -> Option<&str> {
        std::str::from_utf8(self.value(index)?).ok()
    }

    /// Recorded byte length of field `index`, whether or not it was read
    pub fn length(&self, index: usize) -> Option<u64> {
        self.lengths.get(index).copied()
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn into_values(self) -> Vec<Option<Vec<u8>>> {
        self.values
    }
}
