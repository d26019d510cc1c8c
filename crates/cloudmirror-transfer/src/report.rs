//! Per-operation summary

use cloudmirror_core::domain::SkipReason;

/// What one engine operation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub folders_created: u64,
    pub entries_deleted: u64,
    /// Entries left alone, in visit order
    pub skipped: Vec<(String, SkipReason)>,
}

impl TransferReport {
    pub fn record_transfer(&mut self, bytes: u64) {
        self.files_transferred += 1;
        self.bytes_transferred += bytes;
    }

    pub fn record_skip(&mut self, path: impl Into<String>, reason: SkipReason) {
        self.skipped.push((path.into(), reason));
    }

    /// Paths skipped for `reason`
    pub fn skipped_for(&self, reason: SkipReason) -> Vec<&str> {
        self.skipped
            .iter()
            .filter(|(_, r)| *r == reason)
            .map(|(p, _)| p.as_str())
            .collect()
    }
}
