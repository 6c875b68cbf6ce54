//! In-memory implementation of `ChangeJournal`.
//!
//! `InMemoryJournal` keeps every entry in a `Vec` behind a `Mutex`. Use
//! `export()` once a run completes, and `verify_integrity()` at any time to
//! confirm the chain has not been altered.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use edgeward_contracts::{
    change::ChangeRecord,
    error::{EdgewardError, EdgewardResult},
};
use edgeward_core::traits::ChangeJournal;

use crate::{
    chain::{hash_entry, verify_chain},
    event::{JournalEntry, JournalExport},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct JournalState {
    pub(crate) entries: Vec<JournalEntry>,
    pub(crate) sequence: u64,
    /// `this_hash` of the last entry, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

// ── Public journal ────────────────────────────────────────────────────────────

/// An append-only change journal backed by a SHA-256 hash chain.
///
/// Clones share the same chain.
#[derive(Clone)]
pub struct InMemoryJournal {
    journal_id: String,
    pub(crate) state: Arc<Mutex<JournalState>>,
}

impl InMemoryJournal {
    pub fn new(journal_id: impl Into<String>) -> Self {
        let state = JournalState {
            entries: Vec::new(),
            sequence: 0,
            last_hash: JournalEntry::GENESIS_HASH.to_string(),
        };
        Self {
            journal_id: journal_id.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn journal_id(&self) -> &str {
        &self.journal_id
    }

    fn lock(&self) -> EdgewardResult<MutexGuard<'_, JournalState>> {
        self.state.lock().map_err(|e| EdgewardError::JournalWriteFailed {
            reason: format!("journal state lock poisoned: {e}"),
        })
    }

    pub fn len(&self) -> EdgewardResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> EdgewardResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot every entry recorded so far.
    pub fn export(&self) -> EdgewardResult<JournalExport> {
        let state = self.lock()?;
        let terminal_hash = state
            .entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        Ok(JournalExport {
            journal_id: self.journal_id.clone(),
            entries: state.entries.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    /// True if the chain is intact. A poisoned lock counts as not intact.
    pub fn verify_integrity(&self) -> bool {
        match self.lock() {
            Ok(state) => verify_chain(&state.entries),
            Err(_) => false,
        }
    }
}

// ── ChangeJournal impl ────────────────────────────────────────────────────────

impl ChangeJournal for InMemoryJournal {
    fn record(&self, change: &ChangeRecord) -> EdgewardResult<()> {
        let mut state = self.lock()?;

        let prev_hash = state.last_hash.clone();
        let sequence = state.sequence;
        let this_hash = hash_entry(&self.journal_id, sequence, change, &prev_hash)?;

        debug!(
            journal_id = %self.journal_id,
            sequence,
            tag = %change.tag,
            outcome = change.outcome.label(),
            "change journaled"
        );

        state.entries.push(JournalEntry {
            sequence,
            journal_id: self.journal_id.clone(),
            record: change.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.sequence += 1;
        state.last_hash = this_hash;

        Ok(())
    }
}
