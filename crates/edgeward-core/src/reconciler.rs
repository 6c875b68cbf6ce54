//! The rule reconciler: converges one tagged rule towards its desired state.
//!
//! Per (category, domain) the remote side is either ABSENT or PRESENT:
//!
//!   ABSENT  + no body → no-op
//!   ABSENT  + body    → create (position from the ordering table)
//!   PRESENT + body    → patch in place, or no-op if already equal
//!   PRESENT + no body → delete
//!
//! The remote platform has no transactions. A failure part way through a
//! multi-rule update leaves earlier mutations in place; re-running with the
//! same desired state converges because identity is the tag.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use edgeward_contracts::{
    change::{ChangeRecord, ReconcileOutcome, RunId},
    error::{EdgewardError, EdgewardResult},
    policy::{DesiredBody, DesiredRule},
    remote::{RemoteRule, RuleBody, RulePosition, RulesetSnapshot},
};

use crate::{
    ordering,
    traits::{ChangeJournal, ZoneRuleApi},
};

/// Drives `ZoneRuleApi` calls for desired rules and journals each decision.
///
/// One reconciler per run. All calls are issued sequentially; callers must
/// serialize runs for the same domain.
pub struct Reconciler<'a> {
    api: &'a dyn ZoneRuleApi,
    journal: &'a dyn ChangeJournal,
    run_id: RunId,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn ZoneRuleApi, journal: &'a dyn ChangeJournal) -> Self {
        Self { api, journal, run_id: RunId::new() }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Converge the rule tagged by `desired` in zone `zone_id`.
    ///
    /// # Errors
    ///
    /// `DuplicateTag` if more than one remote rule carries the tag; nothing
    /// is mutated in that case. Remote failures propagate unchanged.
    pub async fn reconcile(&self, zone_id: &str, desired: &DesiredRule) -> EdgewardResult<ReconcileOutcome> {
        let tag = desired.tag();
        let phase = desired.category.phase();

        debug!(zone_id, tag = %tag, phase = %phase, present = desired.body.is_some(), "reconcile starting");

        // ── Step 1: Locate the container ─────────────────────────────────────
        //
        // Only a rule that must exist justifies creating the container.
        let container_id = match &desired.body {
            Some(_) => self.api.ensure_container(zone_id, phase).await?,
            None => match self.api.find_container(zone_id, phase).await? {
                Some(found) => found.id,
                None => {
                    debug!(zone_id, tag = %tag, "no container, nothing to delete");
                    let outcome = ReconcileOutcome::Unchanged { rule_id: None };
                    self.journal(zone_id, None, desired, &outcome)?;
                    return Ok(outcome);
                }
            },
        };

        // ── Step 2: Snapshot and identity lookup ─────────────────────────────
        let snapshot = self.api.get_rule_detail(zone_id, &container_id).await?;
        let existing = find_tagged(&snapshot, &tag)?;

        // ── Step 3: Decide and mutate ────────────────────────────────────────
        let outcome = match (existing, &desired.body) {
            (None, None) => ReconcileOutcome::Unchanged { rule_id: None },

            (None, Some(body)) => {
                let position = ordering::resolve_position(desired.category, &snapshot);
                let request = rule_body(&tag, body, position.clone());
                let created = self.api.create_rule(zone_id, &container_id, &request).await?;
                ReconcileOutcome::Created { rule_id: created.id, position }
            }

            (Some(rule), Some(body)) if matches_body(rule, body) => {
                ReconcileOutcome::Unchanged { rule_id: Some(rule.id.clone()) }
            }

            (Some(rule), Some(body)) => {
                let request = rule_body(&tag, body, None);
                self.api.patch_rule(zone_id, &container_id, &rule.id, &request).await?;
                ReconcileOutcome::Patched { rule_id: rule.id.clone() }
            }

            (Some(rule), None) => {
                self.api.delete_rule(zone_id, &container_id, &rule.id).await?;
                ReconcileOutcome::Deleted { rule_id: rule.id.clone() }
            }
        };

        if outcome.is_mutation() {
            info!(zone_id, container_id = %container_id, tag = %tag, outcome = outcome.label(), "rule reconciled");
        } else {
            debug!(zone_id, container_id = %container_id, tag = %tag, "rule already converged");
        }

        // ── Step 4: Journal the decision ─────────────────────────────────────
        self.journal(zone_id, Some(&container_id), desired, &outcome)?;
        Ok(outcome)
    }

    /// Reconcile several rules of one zone in order, stopping at the first
    /// failure.
    pub async fn reconcile_all(
        &self,
        zone_id: &str,
        desired: &[DesiredRule],
    ) -> EdgewardResult<Vec<ReconcileOutcome>> {
        let mut outcomes = Vec::with_capacity(desired.len());
        for rule in desired {
            outcomes.push(self.reconcile(zone_id, rule).await?);
        }
        Ok(outcomes)
    }

    fn journal(
        &self,
        zone_id: &str,
        container_id: Option<&str>,
        desired: &DesiredRule,
        outcome: &ReconcileOutcome,
    ) -> EdgewardResult<()> {
        self.journal.record(&ChangeRecord {
            run_id: self.run_id,
            zone_id: zone_id.to_string(),
            container_id: container_id.map(str::to_string),
            category: desired.category,
            domain: desired.domain.clone(),
            tag: desired.tag(),
            outcome: outcome.clone(),
            expression: desired.body.as_ref().map(|b| b.expression.clone()),
            timestamp: Utc::now(),
        })
    }
}

/// The single rule carrying `tag`, if any.
fn find_tagged<'s>(snapshot: &'s RulesetSnapshot, tag: &str) -> EdgewardResult<Option<&'s RemoteRule>> {
    let mut tagged = snapshot.rules.iter().filter(|r| r.tag == tag);
    let first = tagged.next();
    let extra = tagged.count();
    if extra > 0 {
        return Err(EdgewardError::DuplicateTag {
            container_id: snapshot.id.clone(),
            tag: tag.to_string(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// True if the remote rule already carries the desired body.
///
/// A desired body without a logging block leaves the remote one alone, and
/// parameter keys the desired body does not set are ignored, since the
/// platform echoes its defaults back.
fn matches_body(rule: &RemoteRule, body: &DesiredBody) -> bool {
    rule.expression == body.expression
        && rule.action == body.action
        && rule.enabled == body.enabled
        && body.action_parameters.as_ref().map_or(true, |desired| {
            rule.action_parameters.as_ref().is_some_and(|remote| covers(remote, desired))
        })
        && (body.logging.is_none() || rule.logging == body.logging)
}

/// True if `remote` carries every key of `desired` with an equal value.
/// Objects compare key-wise and recursively; anything else compares exactly.
fn covers(remote: &Value, desired: &Value) -> bool {
    match (remote, desired) {
        (Value::Object(remote), Value::Object(desired)) => desired
            .iter()
            .all(|(key, want)| remote.get(key).is_some_and(|have| covers(have, want))),
        _ => remote == desired,
    }
}

fn rule_body(tag: &str, body: &DesiredBody, position: Option<RulePosition>) -> RuleBody {
    RuleBody {
        description: tag.to_string(),
        action: body.action.clone(),
        expression: body.expression.clone(),
        enabled: body.enabled,
        action_parameters: body.action_parameters.clone(),
        logging: body.logging,
        position,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use edgeward_contracts::{
        change::{ChangeRecord, ReconcileOutcome},
        error::{EdgewardError, EdgewardResult},
        policy::{Category, DesiredRule, RuleAction},
        remote::{ContainerPhase, RemoteRule, RuleLogging, RulePosition},
    };

    use serde_json::json;

    use crate::memory::{ApiCall, InMemoryZoneApi};
    use crate::traits::ChangeJournal;

    use super::Reconciler;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// A journal that records every decision for later inspection.
    #[derive(Default)]
    struct MockJournal {
        records: Arc<Mutex<Vec<ChangeRecord>>>,
    }

    impl ChangeJournal for MockJournal {
        fn record(&self, change: &ChangeRecord) -> EdgewardResult<()> {
            self.records.lock().unwrap().push(change.clone());
            Ok(())
        }
    }

    /// A journal whose writes always fail.
    struct BrokenJournal;

    impl ChangeJournal for BrokenJournal {
        fn record(&self, _change: &ChangeRecord) -> EdgewardResult<()> {
            Err(EdgewardError::JournalWriteFailed { reason: "journal unavailable".to_string() })
        }
    }

    const ZONE: &str = "z1";
    const FW: &str = "fw";
    const DOMAIN: &str = "api.example.com";

    fn platform() -> InMemoryZoneApi {
        let api = InMemoryZoneApi::new();
        api.add_zone("example.com", ZONE).unwrap();
        api.add_container(ZONE, FW, ContainerPhase::FirewallCustom).unwrap();
        api
    }

    fn remote(id: &str, tag: &str, expression: &str) -> RemoteRule {
        RemoteRule {
            id: id.to_string(),
            tag: tag.to_string(),
            expression: expression.to_string(),
            action: RuleAction::Block,
            enabled: true,
            action_parameters: None,
            logging: None,
        }
    }

    fn blacklist(expression: &str) -> DesiredRule {
        DesiredRule::present(Category::BlacklistIp, DOMAIN, RuleAction::Block, expression)
    }

    const BLACK_EXPR: &str = r#"(ip.src in {1.2.3.4 5.6.7.8} and http.host eq "api.example.com")"#;

    // ── Create ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn absent_rule_is_created_and_journaled() {
        let api = platform();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Created { position: None, .. }));
        let rules = api.rules(FW).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].tag, "black_ip_api.example.com");
        assert_eq!(rules[0].expression, BLACK_EXPR);

        let records = journal.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_id, reconciler.run_id());
        assert_eq!(records[0].container_id.as_deref(), Some(FW));
        assert_eq!(records[0].expression.as_deref(), Some(BLACK_EXPR));
    }

    #[tokio::test]
    async fn missing_container_is_provisioned_before_create() {
        let api = InMemoryZoneApi::new();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();

        let containers = api.container_ids(ZONE, ContainerPhase::FirewallCustom).unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(api.rules(&containers[0]).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lost_container_race_uses_the_winner() {
        let api = InMemoryZoneApi::new();
        api.lose_container_race().unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
        assert_eq!(api.container_ids(ZONE, ContainerPhase::FirewallCustom).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_container_create_is_container_missing() {
        let api = InMemoryZoneApi::new();
        api.fail_operation("create_container").unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let err = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap_err();

        assert!(matches!(err, EdgewardError::ContainerMissing { .. }));
        assert!(journal.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn managed_container_of_same_phase_is_ignored() {
        let api = InMemoryZoneApi::new();
        api.add_container_of_kind(ZONE, "managed-ddos", ContainerPhase::DdosL7, "managed").unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let desired = DesiredRule::present(Category::DdosOverride, "", RuleAction::Execute, "true");
        reconciler.reconcile(ZONE, &desired).await.unwrap();

        assert!(api.rules("managed-ddos").unwrap().is_empty());
        assert_eq!(api.container_ids(ZONE, ContainerPhase::DdosL7).unwrap().len(), 1);
    }

    // ── Ordering ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn blacklist_is_placed_after_existing_whitelist() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("W1", "white_ip_api.example.com", "x")).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Created { position: Some(RulePosition::After(ref id)), .. } if id == "W1"
        ));
        let calls = api.calls().unwrap();
        assert!(calls.contains(&ApiCall::CreateRule {
            container_id: FW.to_string(),
            tag: "black_ip_api.example.com".to_string(),
            position: Some(RulePosition::After("W1".to_string())),
        }));
    }

    #[tokio::test]
    async fn whitelist_is_placed_before_existing_blacklist() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("K1", "known_bot_api.example.com", "x")).unwrap();
        api.seed_rule(ZONE, FW, remote("B1", "black_ip_api.example.com", "x")).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let desired = DesiredRule::present(
            Category::WhitelistIp,
            DOMAIN,
            RuleAction::Skip,
            r#"(ip.src in {9.9.9.9} and http.host eq "api.example.com")"#,
        );
        reconciler.reconcile(ZONE, &desired).await.unwrap();

        let tags: Vec<_> = api.rules(FW).unwrap().into_iter().map(|r| r.tag).collect();
        assert_eq!(
            tags,
            vec!["known_bot_api.example.com", "white_ip_api.example.com", "black_ip_api.example.com"]
        );
    }

    // ── Patch ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn changed_expression_is_patched_in_place() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("B1", "black_ip_api.example.com", "old")).unwrap();
        api.seed_rule(ZONE, FW, remote("C1", "country_api.example.com", "x")).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Patched { rule_id: "B1".into() });
        let rules = api.rules(FW).unwrap();
        assert_eq!(rules[0].id, "B1");
        assert_eq!(rules[0].expression, BLACK_EXPR);
        assert_eq!(api.rule_mutations().unwrap(), 1);
    }

    #[tokio::test]
    async fn changed_action_is_patched() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("B1", "black_ip_api.example.com", BLACK_EXPR)).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let desired = DesiredRule::present(Category::BlacklistIp, DOMAIN, RuleAction::Log, BLACK_EXPR);
        let outcome = reconciler.reconcile(ZONE, &desired).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Patched { .. }));
        assert_eq!(api.rules(FW).unwrap()[0].action, RuleAction::Log);
    }

    #[tokio::test]
    async fn remote_logging_is_left_alone_when_not_desired() {
        let api = platform();
        let mut existing = remote("B1", "black_ip_api.example.com", BLACK_EXPR);
        existing.logging = Some(RuleLogging { enabled: false });
        api.seed_rule(ZONE, FW, existing).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap();
        assert!(!outcome.is_mutation());

        let with_logging = blacklist(BLACK_EXPR).with_logging(RuleLogging { enabled: true });
        let outcome = reconciler.reconcile(ZONE, &with_logging).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Patched { .. }));
    }

    #[tokio::test]
    async fn platform_defaulted_parameters_are_not_patched() {
        let api = platform();
        let mut existing = remote("W1", "white_ip_api.example.com", BLACK_EXPR);
        existing.action = RuleAction::Skip;
        existing.action_parameters = Some(json!({
            "ruleset": "current",
            "phases": ["http_ratelimit"],
            "products": ["waf"],
            "overrides": { "enabled": true }
        }));
        api.seed_rule(ZONE, FW, existing).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let skip = |params| {
            DesiredRule::present(Category::WhitelistIp, DOMAIN, RuleAction::Skip, BLACK_EXPR)
                .with_parameters(Some(params))
        };

        let outcome = reconciler
            .reconcile(ZONE, &skip(json!({ "ruleset": "current", "phases": ["http_ratelimit"] })))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged { rule_id: Some("W1".into()) });
        assert_eq!(api.rule_mutations().unwrap(), 0);

        // A changed value, or a list that differs, still patches.
        let outcome = reconciler
            .reconcile(ZONE, &skip(json!({ "ruleset": "current", "phases": ["http_request_sbfm"] })))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Patched { .. }));
    }

    // ── Delete ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_desired_state_issues_exactly_one_delete() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("B1", "black_ip_api.example.com", BLACK_EXPR)).unwrap();
        api.seed_rule(ZONE, FW, remote("B2", "black_ip_other.example.com", "x")).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler
            .reconcile(ZONE, &DesiredRule::absent(Category::BlacklistIp, DOMAIN))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Deleted { rule_id: "B1".into() });
        let mutations: Vec<_> = api.calls().unwrap().into_iter().filter(|c| c.is_rule_mutation()).collect();
        assert_eq!(
            mutations,
            vec![ApiCall::DeleteRule { container_id: FW.to_string(), rule_id: "B1".to_string() }]
        );
        assert_eq!(api.rules(FW).unwrap().len(), 1);
        assert_eq!(journal.records.lock().unwrap()[0].expression, None);
    }

    #[tokio::test]
    async fn absent_rule_without_container_creates_nothing() {
        let api = InMemoryZoneApi::new();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let outcome = reconciler
            .reconcile(ZONE, &DesiredRule::absent(Category::Country, DOMAIN))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged { rule_id: None });
        assert!(api.container_ids(ZONE, ContainerPhase::FirewallCustom).unwrap().is_empty());
        assert!(!api.calls().unwrap().iter().any(|c| matches!(c, ApiCall::CreateContainer { .. })));

        let records = journal.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].container_id, None);
    }

    // ── Idempotence ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn second_run_issues_no_mutations() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("W1", "white_ip_api.example.com", "x")).unwrap();
        let desired = vec![
            blacklist(BLACK_EXPR),
            DesiredRule::present(Category::Country, DOMAIN, RuleAction::Block, "(ip.src.country in {\"CN\"} and http.host eq \"api.example.com\")"),
            DesiredRule::absent(Category::WhitelistIp, DOMAIN),
        ];
        let journal = MockJournal::default();

        let first = Reconciler::new(&api, &journal).reconcile_all(ZONE, &desired).await.unwrap();
        assert!(first.iter().all(|o| o.is_mutation()));

        api.clear_calls().unwrap();
        let second = Reconciler::new(&api, &journal).reconcile_all(ZONE, &desired).await.unwrap();

        assert!(second.iter().all(|o| !o.is_mutation()));
        assert_eq!(api.rule_mutations().unwrap(), 0);
        assert_eq!(journal.records.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn rerun_after_partial_failure_converges() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("C1", "country_api.example.com", "x")).unwrap();
        api.fail_operation("delete_rule").unwrap();
        let desired = vec![blacklist(BLACK_EXPR), DesiredRule::absent(Category::Country, DOMAIN)];
        let journal = MockJournal::default();

        let err = Reconciler::new(&api, &journal).reconcile_all(ZONE, &desired).await.unwrap_err();
        assert!(matches!(err, EdgewardError::RemoteApi { .. }));
        assert_eq!(api.rules(FW).unwrap().len(), 2);

        api.restore_operation("delete_rule").unwrap();
        let outcomes = Reconciler::new(&api, &journal).reconcile_all(ZONE, &desired).await.unwrap();

        assert!(!outcomes[0].is_mutation());
        assert!(matches!(outcomes[1], ReconcileOutcome::Deleted { .. }));
        assert_eq!(api.rules(FW).unwrap().len(), 1);
    }

    // ── Inconsistencies ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn duplicate_tag_aborts_without_mutation() {
        let api = platform();
        api.seed_rule(ZONE, FW, remote("B1", "black_ip_api.example.com", "a")).unwrap();
        api.seed_rule(ZONE, FW, remote("B2", "black_ip_api.example.com", "b")).unwrap();
        let journal = MockJournal::default();
        let reconciler = Reconciler::new(&api, &journal);

        let err = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap_err();

        assert!(matches!(err, EdgewardError::DuplicateTag { count: 2, .. }));
        assert_eq!(api.rule_mutations().unwrap(), 0);
        assert!(journal.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn journal_failure_is_returned_after_the_mutation() {
        let api = platform();
        let reconciler = Reconciler::new(&api, &BrokenJournal);

        let err = reconciler.reconcile(ZONE, &blacklist(BLACK_EXPR)).await.unwrap_err();

        assert!(matches!(err, EdgewardError::JournalWriteFailed { .. }));
        assert_eq!(api.rules(FW).unwrap().len(), 1);
    }
}
