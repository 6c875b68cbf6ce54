//! In-memory implementation of `ZoneRuleApi`.
//!
//! `InMemoryZoneApi` is the reference implementation of the remote
//! platform. It keeps zones, containers and ordered rules behind a
//! `Mutex`, honors position hints on create, and records every call so
//! tests can assert exactly which requests a reconciliation issued.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use edgeward_contracts::{
    error::{EdgewardError, EdgewardResult},
    remote::{ContainerPhase, ContainerSummary, RemoteRule, RuleBody, RulePosition, RulesetSnapshot},
};

use crate::traits::ZoneRuleApi;

/// One request received by the in-memory platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ResolveZone { zone_name: String },
    ListContainers { zone_id: String },
    CreateContainer { zone_id: String, phase: ContainerPhase },
    GetRuleDetail { container_id: String },
    CreateRule { container_id: String, tag: String, position: Option<RulePosition> },
    PatchRule { container_id: String, rule_id: String },
    DeleteRule { container_id: String, rule_id: String },
}

impl ApiCall {
    /// True for calls that change a rule.
    pub fn is_rule_mutation(&self) -> bool {
        matches!(
            self,
            ApiCall::CreateRule { .. } | ApiCall::PatchRule { .. } | ApiCall::DeleteRule { .. }
        )
    }

    fn operation(&self) -> &'static str {
        match self {
            ApiCall::ResolveZone { .. } => "resolve_zone",
            ApiCall::ListContainers { .. } => "list_containers",
            ApiCall::CreateContainer { .. } => "create_container",
            ApiCall::GetRuleDetail { .. } => "get_rule_detail",
            ApiCall::CreateRule { .. } => "create_rule",
            ApiCall::PatchRule { .. } => "patch_rule",
            ApiCall::DeleteRule { .. } => "delete_rule",
        }
    }
}

// ── Internal mutable state ────────────────────────────────────────────────────

struct StoredContainer {
    zone_id: String,
    summary: ContainerSummary,
    rules: Vec<RemoteRule>,
}

#[derive(Default)]
struct InMemoryState {
    /// Zone name → zone id.
    zones: HashMap<String, String>,
    containers: Vec<StoredContainer>,
    calls: Vec<ApiCall>,
    next_id: u64,
    /// Operations that fail with a 500.
    failing: BTreeSet<&'static str>,
    /// A create-container call provisions the container but still reports
    /// failure, as if another writer created it first.
    lose_container_race: bool,
}

impl InMemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Record `call`, then fail it if its operation is marked failing.
    fn enter(&mut self, call: ApiCall, endpoint: &str) -> EdgewardResult<()> {
        let op = call.operation();
        self.calls.push(call);
        if self.failing.contains(op) {
            return Err(EdgewardError::RemoteApi {
                endpoint: endpoint.to_string(),
                status: Some(500),
                message: format!("injected {op} failure"),
            });
        }
        Ok(())
    }

    fn container_mut(&mut self, zone_id: &str, container_id: &str) -> EdgewardResult<&mut StoredContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.zone_id == zone_id && c.summary.id == container_id)
            .ok_or_else(|| not_found(format!("/zones/{zone_id}/rulesets/{container_id}"), "ruleset not found"))
    }
}

fn not_found(endpoint: String, message: &str) -> EdgewardError {
    EdgewardError::RemoteApi { endpoint, status: Some(404), message: message.to_string() }
}

// ── Public platform ───────────────────────────────────────────────────────────

/// An in-memory rule platform.
///
/// Cloning shares the underlying state, so a test can hand one clone to
/// the code under test and inspect the other.
#[derive(Clone, Default)]
pub struct InMemoryZoneApi {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryZoneApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> EdgewardResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| EdgewardError::RemoteApi {
            endpoint: "in-memory".to_string(),
            status: None,
            message: format!("state lock poisoned: {e}"),
        })
    }

    /// Register a zone name and its id.
    pub fn add_zone(&self, zone_name: &str, zone_id: &str) -> EdgewardResult<()> {
        self.state()?.zones.insert(zone_name.to_string(), zone_id.to_string());
        Ok(())
    }

    /// Provision a container directly, without recording a call.
    pub fn add_container(&self, zone_id: &str, container_id: &str, phase: ContainerPhase) -> EdgewardResult<()> {
        self.add_container_of_kind(zone_id, container_id, phase, "zone")
    }

    /// Provision a container of an arbitrary kind (e.g. `managed`).
    pub fn add_container_of_kind(
        &self,
        zone_id: &str,
        container_id: &str,
        phase: ContainerPhase,
        kind: &str,
    ) -> EdgewardResult<()> {
        self.state()?.containers.push(StoredContainer {
            zone_id: zone_id.to_string(),
            summary: ContainerSummary {
                id: container_id.to_string(),
                name: phase.ruleset_name().to_string(),
                phase: phase.as_str().to_string(),
                kind: kind.to_string(),
            },
            rules: Vec::new(),
        });
        Ok(())
    }

    /// Append a rule to a container directly, without recording a call.
    pub fn seed_rule(&self, zone_id: &str, container_id: &str, rule: RemoteRule) -> EdgewardResult<()> {
        self.state()?.container_mut(zone_id, container_id)?.rules.push(rule);
        Ok(())
    }

    /// Make every later call of `operation` (e.g. `"patch_rule"`) fail.
    pub fn fail_operation(&self, operation: &'static str) -> EdgewardResult<()> {
        self.state()?.failing.insert(operation);
        Ok(())
    }

    pub fn restore_operation(&self, operation: &str) -> EdgewardResult<()> {
        self.state()?.failing.remove(operation);
        Ok(())
    }

    pub fn lose_container_race(&self) -> EdgewardResult<()> {
        self.state()?.lose_container_race = true;
        Ok(())
    }

    /// The rules of a container, in evaluation order.
    pub fn rules(&self, container_id: &str) -> EdgewardResult<Vec<RemoteRule>> {
        let state = self.state()?;
        Ok(state
            .containers
            .iter()
            .find(|c| c.summary.id == container_id)
            .map(|c| c.rules.clone())
            .unwrap_or_default())
    }

    /// The ids of the zone's containers for `phase`, zone-kind only.
    pub fn container_ids(&self, zone_id: &str, phase: ContainerPhase) -> EdgewardResult<Vec<String>> {
        let state = self.state()?;
        Ok(state
            .containers
            .iter()
            .filter(|c| c.zone_id == zone_id && c.summary.phase == phase.as_str() && c.summary.kind == "zone")
            .map(|c| c.summary.id.clone())
            .collect())
    }

    pub fn calls(&self) -> EdgewardResult<Vec<ApiCall>> {
        Ok(self.state()?.calls.clone())
    }

    /// Number of create, patch and delete rule calls received so far.
    pub fn rule_mutations(&self) -> EdgewardResult<usize> {
        Ok(self.state()?.calls.iter().filter(|c| c.is_rule_mutation()).count())
    }

    pub fn clear_calls(&self) -> EdgewardResult<()> {
        self.state()?.calls.clear();
        Ok(())
    }
}

// ── ZoneRuleApi impl ──────────────────────────────────────────────────────────

#[async_trait]
impl ZoneRuleApi for InMemoryZoneApi {
    async fn resolve_zone(&self, zone_name: &str) -> EdgewardResult<String> {
        let mut state = self.state()?;
        state.enter(ApiCall::ResolveZone { zone_name: zone_name.to_string() }, "/zones")?;
        state
            .zones
            .get(zone_name)
            .cloned()
            .ok_or_else(|| EdgewardError::ZoneNotFound { zone: zone_name.to_string() })
    }

    async fn list_containers(&self, zone_id: &str) -> EdgewardResult<Vec<ContainerSummary>> {
        let mut state = self.state()?;
        state.enter(
            ApiCall::ListContainers { zone_id: zone_id.to_string() },
            &format!("/zones/{zone_id}/rulesets"),
        )?;
        Ok(state
            .containers
            .iter()
            .filter(|c| c.zone_id == zone_id)
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn create_container(&self, zone_id: &str, phase: ContainerPhase) -> EdgewardResult<ContainerSummary> {
        let endpoint = format!("/zones/{zone_id}/rulesets");
        let mut state = self.state()?;
        state.enter(ApiCall::CreateContainer { zone_id: zone_id.to_string(), phase }, &endpoint)?;

        let summary = ContainerSummary {
            id: state.next_id("ruleset"),
            name: phase.ruleset_name().to_string(),
            phase: phase.as_str().to_string(),
            kind: "zone".to_string(),
        };
        state.containers.push(StoredContainer {
            zone_id: zone_id.to_string(),
            summary: summary.clone(),
            rules: Vec::new(),
        });

        if state.lose_container_race {
            state.lose_container_race = false;
            return Err(EdgewardError::RemoteApi {
                endpoint,
                status: Some(400),
                message: "a ruleset for this phase already exists".to_string(),
            });
        }
        debug!(zone_id, container_id = %summary.id, phase = %phase, "container provisioned");
        Ok(summary)
    }

    async fn get_rule_detail(&self, zone_id: &str, container_id: &str) -> EdgewardResult<RulesetSnapshot> {
        let mut state = self.state()?;
        state.enter(
            ApiCall::GetRuleDetail { container_id: container_id.to_string() },
            &format!("/zones/{zone_id}/rulesets/{container_id}"),
        )?;
        let container = state.container_mut(zone_id, container_id)?;
        Ok(RulesetSnapshot {
            id: container.summary.id.clone(),
            name: container.summary.name.clone(),
            phase: container.summary.phase.clone(),
            rules: container.rules.clone(),
        })
    }

    async fn create_rule(&self, zone_id: &str, container_id: &str, body: &RuleBody) -> EdgewardResult<RemoteRule> {
        let endpoint = format!("/zones/{zone_id}/rulesets/{container_id}/rules");
        let mut state = self.state()?;
        state.enter(
            ApiCall::CreateRule {
                container_id: container_id.to_string(),
                tag: body.description.clone(),
                position: body.position.clone(),
            },
            &endpoint,
        )?;

        let rule = RemoteRule {
            id: state.next_id("rule"),
            tag: body.description.clone(),
            expression: body.expression.clone(),
            action: body.action.clone(),
            enabled: body.enabled,
            action_parameters: body.action_parameters.clone(),
            logging: body.logging,
        };

        let container = state.container_mut(zone_id, container_id)?;
        let index = match &body.position {
            None => container.rules.len(),
            Some(position) => {
                let (anchor, offset) = match position {
                    RulePosition::Before(id) => (id, 0),
                    RulePosition::After(id) => (id, 1),
                };
                let found = container.rules.iter().position(|r| &r.id == anchor).ok_or_else(|| {
                    EdgewardError::RemoteApi {
                        endpoint: endpoint.clone(),
                        status: Some(400),
                        message: format!("position references unknown rule {anchor}"),
                    }
                })?;
                found + offset
            }
        };
        container.rules.insert(index, rule.clone());
        Ok(rule)
    }

    async fn patch_rule(
        &self,
        zone_id: &str,
        container_id: &str,
        rule_id: &str,
        body: &RuleBody,
    ) -> EdgewardResult<RemoteRule> {
        let endpoint = format!("/zones/{zone_id}/rulesets/{container_id}/rules/{rule_id}");
        let mut state = self.state()?;
        state.enter(
            ApiCall::PatchRule { container_id: container_id.to_string(), rule_id: rule_id.to_string() },
            &endpoint,
        )?;

        let container = state.container_mut(zone_id, container_id)?;
        let rule = container
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| not_found(endpoint, "rule not found"))?;
        rule.tag = body.description.clone();
        rule.expression = body.expression.clone();
        rule.action = body.action.clone();
        rule.enabled = body.enabled;
        rule.action_parameters = body.action_parameters.clone();
        if body.logging.is_some() {
            rule.logging = body.logging;
        }
        Ok(rule.clone())
    }

    async fn delete_rule(&self, zone_id: &str, container_id: &str, rule_id: &str) -> EdgewardResult<()> {
        let endpoint = format!("/zones/{zone_id}/rulesets/{container_id}/rules/{rule_id}");
        let mut state = self.state()?;
        state.enter(
            ApiCall::DeleteRule { container_id: container_id.to_string(), rule_id: rule_id.to_string() },
            &endpoint,
        )?;

        let container = state.container_mut(zone_id, container_id)?;
        let before = container.rules.len();
        container.rules.retain(|r| r.id != rule_id);
        if container.rules.len() == before {
            return Err(not_found(endpoint, "rule not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_contracts::policy::RuleAction;

    fn body(tag: &str, position: Option<RulePosition>) -> RuleBody {
        RuleBody {
            description: tag.to_string(),
            action: RuleAction::Block,
            expression: "true".to_string(),
            enabled: true,
            action_parameters: None,
            logging: None,
            position,
        }
    }

    fn platform() -> InMemoryZoneApi {
        let api = InMemoryZoneApi::new();
        api.add_zone("example.com", "z1").unwrap();
        api.add_container("z1", "fw", ContainerPhase::FirewallCustom).unwrap();
        api
    }

    #[tokio::test]
    async fn create_honors_position_hints() {
        let api = platform();
        let a = api.create_rule("z1", "fw", &body("a", None)).await.unwrap();
        let b = api.create_rule("z1", "fw", &body("b", None)).await.unwrap();
        api.create_rule("z1", "fw", &body("before_b", Some(RulePosition::Before(b.id.clone()))))
            .await
            .unwrap();
        api.create_rule("z1", "fw", &body("after_a", Some(RulePosition::After(a.id))))
            .await
            .unwrap();

        let tags: Vec<_> = api.rules("fw").unwrap().into_iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec!["a", "after_a", "before_b", "b"]);
    }

    #[tokio::test]
    async fn unknown_anchor_is_rejected() {
        let api = platform();
        let err = api
            .create_rule("z1", "fw", &body("a", Some(RulePosition::After("nope".into()))))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgewardError::RemoteApi { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn patch_keeps_id_and_position() {
        let api = platform();
        let a = api.create_rule("z1", "fw", &body("a", None)).await.unwrap();
        api.create_rule("z1", "fw", &body("b", None)).await.unwrap();

        let mut changed = body("a", None);
        changed.expression = "false".into();
        let patched = api.patch_rule("z1", "fw", &a.id, &changed).await.unwrap();

        assert_eq!(patched.id, a.id);
        let rules = api.rules("fw").unwrap();
        assert_eq!(rules[0].id, a.id);
        assert_eq!(rules[0].expression, "false");
    }

    #[tokio::test]
    async fn unknown_zone_is_zone_not_found() {
        let api = platform();
        let err = api.resolve_zone("other.com").await.unwrap_err();
        assert!(matches!(err, EdgewardError::ZoneNotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failure_is_recorded_and_returned() {
        let api = platform();
        api.fail_operation("delete_rule").unwrap();
        let err = api.delete_rule("z1", "fw", "rule-1").await.unwrap_err();
        assert!(matches!(err, EdgewardError::RemoteApi { status: Some(500), .. }));
        assert_eq!(api.rule_mutations().unwrap(), 1);
    }
}
