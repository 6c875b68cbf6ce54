//! # edgeward-audit
//!
//! Append-only, SHA-256 hash-chained journal of reconciliation decisions.
//!
//! Every decision the reconciler takes, no-ops included, is wrapped in a
//! `JournalEntry` that links to the previous entry via its hash. Editing
//! any entry breaks the chain and is detected by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edgeward_audit::InMemoryJournal;
//! use edgeward_core::Reconciler;
//!
//! let journal = InMemoryJournal::new("run-001");
//! Reconciler::new(&api, &journal).reconcile(zone_id, &desired).await?;
//!
//! assert!(journal.verify_integrity());
//! let export = journal.export()?;
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use event::{JournalEntry, JournalExport};
pub use memory::InMemoryJournal;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use edgeward_contracts::{
        change::{ChangeRecord, ReconcileOutcome, RunId},
        policy::Category,
    };
    use edgeward_core::traits::ChangeJournal;

    use super::{verify_chain, InMemoryJournal, JournalEntry};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn make_record(domain: &str, outcome: ReconcileOutcome) -> ChangeRecord {
        ChangeRecord {
            run_id: RunId(uuid::Uuid::nil()),
            zone_id: "z1".to_string(),
            container_id: Some("fw".to_string()),
            category: Category::BlacklistIp,
            domain: domain.to_string(),
            tag: Category::BlacklistIp.tag(domain),
            outcome,
            expression: Some(format!("(ip.src in {{1.2.3.4}} and http.host eq \"{domain}\")")),
            timestamp: Utc::now(),
        }
    }

    fn created(id: &str) -> ReconcileOutcome {
        ReconcileOutcome::Created { rule_id: id.to_string(), position: None }
    }

    fn filled_journal() -> InMemoryJournal {
        let journal = InMemoryJournal::new("run-test");
        journal.record(&make_record("a.io", created("r1"))).unwrap();
        journal
            .record(&make_record("b.io", ReconcileOutcome::Unchanged { rule_id: Some("r2".into()) }))
            .unwrap();
        journal
            .record(&make_record("c.io", ReconcileOutcome::Deleted { rule_id: "r3".into() }))
            .unwrap();
        journal
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[test]
    fn sequential_records_form_a_valid_chain() {
        let journal = filled_journal();
        assert_eq!(journal.len().unwrap(), 3);
        assert!(journal.verify_integrity());
    }

    #[test]
    fn editing_a_record_breaks_the_chain() {
        let journal = filled_journal();
        {
            let mut state = journal.state.lock().unwrap();
            state.entries[0].record.outcome = ReconcileOutcome::Unchanged { rule_id: None };
        }
        assert!(!journal.verify_integrity());
    }

    #[test]
    fn dropping_an_entry_breaks_the_chain() {
        let journal = filled_journal();
        {
            let mut state = journal.state.lock().unwrap();
            state.entries.remove(1);
        }
        assert!(!journal.verify_integrity());
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let journal = filled_journal();
        let export = journal.export().unwrap();
        assert_eq!(export.entries[0].prev_hash, JournalEntry::GENESIS_HASH);
        assert_eq!(export.entries[1].prev_hash, export.entries[0].this_hash);
    }

    #[test]
    fn export_carries_every_entry_in_order() {
        let journal = filled_journal();
        let export = journal.export().unwrap();

        assert_eq!(export.journal_id, "run-test");
        let domains: Vec<_> = export.entries.iter().map(|e| e.record.domain.as_str()).collect();
        assert_eq!(domains, vec!["a.io", "b.io", "c.io"]);
        assert_eq!(export.terminal_hash, export.entries[2].this_hash);
        assert_eq!(export.mutation_count(), 2);
        assert!(verify_chain(&export.entries));
    }

    #[test]
    fn export_survives_json_round_trip() {
        let export = filled_journal().export().unwrap();
        let json = serde_json::to_string(&export).unwrap();
        let back: super::JournalExport = serde_json::from_str(&json).unwrap();
        assert!(verify_chain(&back.entries));
    }

    #[test]
    fn empty_journal_is_valid() {
        let journal = InMemoryJournal::new("run-empty");
        assert!(journal.is_empty().unwrap());
        assert!(journal.verify_integrity());
        assert_eq!(journal.export().unwrap().terminal_hash, "");
        assert!(verify_chain(&[]));
    }

    #[test]
    fn clones_share_one_chain() {
        let journal = InMemoryJournal::new("run-shared");
        let other = journal.clone();
        other.record(&make_record("a.io", created("r1"))).unwrap();
        journal.record(&make_record("b.io", created("r2"))).unwrap();
        assert_eq!(journal.len().unwrap(), 2);
        assert!(journal.verify_integrity());
    }
}
