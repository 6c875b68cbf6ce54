//! Reconciliation outcomes and the change records written to the journal.
//!
//! `ReconcileOutcome` is what the reconciler returns for one (category,
//! domain) pair. `ChangeRecord` is what gets journaled, one per decision,
//! including decisions that changed nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{policy::Category, remote::RulePosition};

/// Identifies one reconciliation run (one service invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The decision taken for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Remote state already matched; no mutating call was issued.
    Unchanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
    },
    Created {
        rule_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<RulePosition>,
    },
    Patched { rule_id: String },
    Deleted { rule_id: String },
}

impl ReconcileOutcome {
    /// True if a create, patch or delete call was issued.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ReconcileOutcome::Unchanged { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged { .. } => "unchanged",
            ReconcileOutcome::Created { .. } => "created",
            ReconcileOutcome::Patched { .. } => "patched",
            ReconcileOutcome::Deleted { .. } => "deleted",
        }
    }
}

/// One journaled reconciliation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub run_id: RunId,
    pub zone_id: String,
    pub container_id: Option<String>,
    pub category: Category,
    pub domain: String,
    pub tag: String,
    pub outcome: ReconcileOutcome,
    /// Expression the rule carries after the decision; `None` when absent.
    pub expression: Option<String>,
    pub timestamp: DateTime<Utc>,
}
