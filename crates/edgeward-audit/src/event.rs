//! Journal entry and export types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edgeward_contracts::change::ChangeRecord;

/// One reconciliation decision, linked into the hash chain.
///
/// Editing any field, including those of the embedded `record`, invalidates
/// `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub journal_id: String,

    pub record: ChangeRecord,

    /// Hash of the previous entry, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,

    /// SHA-256 over (journal_id, sequence, prev_hash, record).
    pub this_hash: String,
}

impl JournalEntry {
    /// The `prev_hash` of the first entry in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of the whole journal.
///
/// `terminal_hash` is the `this_hash` of the last entry and commits to the
/// entire log; empty when nothing was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalExport {
    pub journal_id: String,
    pub entries: Vec<JournalEntry>,
    pub exported_at: DateTime<Utc>,
    pub terminal_hash: String,
}

impl JournalExport {
    /// Number of entries that changed the remote platform.
    pub fn mutation_count(&self) -> usize {
        self.entries.iter().filter(|e| e.record.outcome.is_mutation()).count()
    }
}
