//! Core trait definitions for the reconciliation pipeline.
//!
//! - `ZoneRuleApi`: the remote platform (untrusted, fallible, slow)
//! - `ChangeJournal`: trusted sink (records every decision)
//!
//! The reconciler wires them together. Every call into `ZoneRuleApi` is a
//! suspension point; the reconciler issues them strictly one at a time.

use async_trait::async_trait;
use tracing::{debug, warn};

use edgeward_contracts::{
    change::ChangeRecord,
    error::{EdgewardError, EdgewardResult},
    remote::{ContainerPhase, ContainerSummary, RemoteRule, RuleBody, RulesetSnapshot},
};

/// Client for the rule containers of a zone.
///
/// Implementations own persistence and transport. They hold no policy
/// knowledge: identity, ordering and the create/patch/delete decision all
/// belong to the reconciler.
#[async_trait]
pub trait ZoneRuleApi: Send + Sync {
    /// Resolve a zone name (e.g. `example.com`) to its zone id.
    async fn resolve_zone(&self, zone_name: &str) -> EdgewardResult<String>;

    /// List the rule containers of a zone, without their rules.
    async fn list_containers(&self, zone_id: &str) -> EdgewardResult<Vec<ContainerSummary>>;

    /// Create an empty zone-level container for `phase`.
    async fn create_container(
        &self,
        zone_id: &str,
        phase: ContainerPhase,
    ) -> EdgewardResult<ContainerSummary>;

    /// Fetch a whole container, rules included. There is no fetch by tag.
    async fn get_rule_detail(
        &self,
        zone_id: &str,
        container_id: &str,
    ) -> EdgewardResult<RulesetSnapshot>;

    /// The rules of a container, in evaluation order.
    async fn list_rules(&self, zone_id: &str, container_id: &str) -> EdgewardResult<Vec<RemoteRule>> {
        Ok(self.get_rule_detail(zone_id, container_id).await?.rules)
    }

    /// Append a rule, honoring `body.position` if set.
    async fn create_rule(
        &self,
        zone_id: &str,
        container_id: &str,
        body: &RuleBody,
    ) -> EdgewardResult<RemoteRule>;

    /// Replace a rule's body in place. The rule keeps its id and position.
    async fn patch_rule(
        &self,
        zone_id: &str,
        container_id: &str,
        rule_id: &str,
        body: &RuleBody,
    ) -> EdgewardResult<RemoteRule>;

    async fn delete_rule(&self, zone_id: &str, container_id: &str, rule_id: &str) -> EdgewardResult<()>;

    /// Find the zone's container for `phase` without creating it.
    async fn find_container(
        &self,
        zone_id: &str,
        phase: ContainerPhase,
    ) -> EdgewardResult<Option<ContainerSummary>> {
        let containers = self.list_containers(zone_id).await?;
        Ok(select_container(containers, phase))
    }

    /// Return the id of the zone's container for `phase`, creating it first
    /// if it does not exist.
    ///
    /// Check-then-create. A failed create is tolerated if a re-list shows
    /// the container exists (another writer won the race).
    async fn ensure_container(&self, zone_id: &str, phase: ContainerPhase) -> EdgewardResult<String> {
        if let Some(found) = self.find_container(zone_id, phase).await? {
            return Ok(found.id);
        }

        debug!(zone_id, phase = %phase, "container missing, creating");
        let create_err = match self.create_container(zone_id, phase).await {
            Ok(created) => return Ok(created.id),
            Err(e) => e,
        };

        match self.find_container(zone_id, phase).await? {
            Some(found) => {
                debug!(zone_id, phase = %phase, container_id = %found.id, "container created concurrently");
                Ok(found.id)
            }
            None => {
                warn!(zone_id, phase = %phase, error = %create_err, "container could not be ensured");
                Err(EdgewardError::ContainerMissing {
                    zone_id: zone_id.to_string(),
                    phase: phase.as_str().to_string(),
                })
            }
        }
    }
}

/// Pick the zone-level container for `phase` from a listing.
///
/// Managed rulesets share phases with zone containers (the managed DDoS
/// ruleset is also `ddos_l7`), so only zone-kind entries qualify.
pub fn select_container(
    containers: Vec<ContainerSummary>,
    phase: ContainerPhase,
) -> Option<ContainerSummary> {
    containers
        .into_iter()
        .find(|c| c.phase == phase.as_str() && (c.kind.is_empty() || c.kind == "zone"))
}

/// The change journal: the record of every reconciliation decision.
///
/// Every decision, including no-ops, produces exactly one `ChangeRecord`.
/// A failed write is returned to the caller; the remote mutation it
/// describes has already happened and is not rolled back.
pub trait ChangeJournal: Send + Sync {
    /// Append one record. Implementations must treat this as append-only.
    fn record(&self, change: &ChangeRecord) -> EdgewardResult<()>;
}
