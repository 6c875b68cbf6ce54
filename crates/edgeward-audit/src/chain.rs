//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. journal_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the change record

use sha2::{Digest, Sha256};

use edgeward_contracts::{
    change::ChangeRecord,
    error::{EdgewardError, EdgewardResult},
};

use crate::event::JournalEntry;

/// Compute the SHA-256 hash for a single journal entry.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_entry(
    journal_id: &str,
    sequence: u64,
    record: &ChangeRecord,
    prev_hash: &str,
) -> EdgewardResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| EdgewardError::JournalWriteFailed {
        reason: format!("change record is not serializable: {e}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(journal_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Valid when every entry links to its predecessor (or `GENESIS_HASH` for
/// the first) and every stored hash matches the recomputed one. Sequence
/// numbers must be contiguous from zero. An empty chain is valid.
pub fn verify_chain(entries: &[JournalEntry]) -> bool {
    let mut expected_prev = JournalEntry::GENESIS_HASH.to_string();

    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence != index as u64 || entry.prev_hash != expected_prev {
            return false;
        }

        match hash_entry(&entry.journal_id, entry.sequence, &entry.record, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
