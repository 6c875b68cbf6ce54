//! Read views: current policy decoded back from the platform.
//!
//! Views never mutate. A zone without the relevant container contributes
//! nothing. Rules the decompiler cannot fully read are listed in `skipped`
//! with their raw expression rather than dropped.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use edgeward_contracts::{
    condition::{Condition, ConditionValue, Field, Operator},
    error::EdgewardResult,
    payload::AccessMode,
    policy::{CacheParameters, Category, CustomField, RuleAction, Sensitivity, TtlSetting, DDOS_OVERRIDE_TAG},
    remote::{ContainerPhase, RemoteRule},
};
use edgeward_core::traits::ZoneRuleApi;
use edgeward_expr::{decompile, Decompiled, SkippedClause};

// ── View types ──────────────────────────────────────────────────────────────

/// A rule that could not be read, or was read only in part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableRule {
    pub tag: String,
    pub expression: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<SkippedClause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryView {
    pub access_mode: AccessMode,
    pub codes: Vec<String>,
}

/// IP and geo rules, keyed by host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WafView {
    pub black_ip_list: BTreeMap<String, Vec<String>>,
    pub white_ip_list: BTreeMap<String, Vec<String>>,
    pub country_list: BTreeMap<String, CountryView>,
    pub skipped: Vec<UnreadableRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownBotView {
    pub value: bool,
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedBotView {
    #[serde(rename = "type")]
    pub operator: Operator,
    pub value: Vec<String>,
    pub action: RuleAction,
}

/// Bot rules, keyed by host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotView {
    pub known_bot_list: BTreeMap<String, KnownBotView>,
    pub verified_category_list: BTreeMap<String, VerifiedBotView>,
    pub skipped: Vec<UnreadableRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomRuleView {
    pub field: CustomField,
    pub action: RuleAction,
    /// Flat, tagged list, as the policy UI edits it.
    pub conditions: Vec<Condition>,
    pub skipped: Vec<SkippedClause>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomView {
    pub rules: BTreeMap<String, Vec<CustomRuleView>>,
    pub skipped: Vec<UnreadableRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheView {
    pub cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_ttl: Option<TtlSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_ttl: Option<TtlSetting>,
    pub conditions: Vec<Condition>,
    pub skipped: Vec<SkippedClause>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSettingsView {
    pub domains: BTreeMap<String, CacheView>,
    pub skipped: Vec<UnreadableRule>,
}

/// DDoS sensitivity per zone, as UI levels.
pub type DdosView = BTreeMap<String, String>;

// ── Decoding ────────────────────────────────────────────────────────────────

/// Collects rules that could not be decoded while a view is built.
#[derive(Default)]
struct Unreadable(Vec<UnreadableRule>);

impl Unreadable {
    fn push(&mut self, rule: &RemoteRule, reason: impl Into<String>, clauses: Vec<SkippedClause>) {
        self.0.push(UnreadableRule {
            tag: rule.tag.clone(),
            expression: rule.expression.clone(),
            reason: reason.into(),
            clauses,
        });
    }

    /// Decompile `rule`. A lossy result is returned and also recorded.
    fn read(&mut self, rule: &RemoteRule) -> Option<Decompiled> {
        match decompile(&rule.expression) {
            Ok(decoded) => {
                if !decoded.is_lossless() {
                    warn!(tag = %rule.tag, skipped = decoded.skipped.len(), "rule has unrecognized clauses");
                    self.push(rule, "unrecognized clauses", decoded.skipped.clone());
                }
                Some(decoded)
            }
            Err(e) => {
                warn!(tag = %rule.tag, error = %e, "rule expression could not be decoded");
                self.push(rule, e.to_string(), Vec::new());
                None
            }
        }
    }

    /// The first condition on `field`, or a recorded miss.
    fn find(&mut self, rule: &RemoteRule, decoded: &Decompiled, field: Field) -> Option<Condition> {
        let found = decoded.groups.iter().flat_map(|g| g.iter()).find(|c| c.field == field).cloned();
        if found.is_none() {
            self.push(rule, format!("no {field} condition"), Vec::new());
        }
        found
    }
}

/// The category a rule belongs to, if it is one of `wanted`.
fn categorized(rule: &RemoteRule, wanted: impl Fn(Category) -> bool) -> Option<Category> {
    Category::parse_tag(&rule.tag).map(|(category, _)| category).filter(|c| wanted(*c))
}

// ── Reader ──────────────────────────────────────────────────────────────────

/// Builds read views for a set of zones.
pub struct PolicyReader<'a> {
    api: &'a dyn ZoneRuleApi,
}

impl<'a> PolicyReader<'a> {
    pub fn new(api: &'a dyn ZoneRuleApi) -> Self {
        Self { api }
    }

    /// Rules of each zone's `phase` container, zones in the order given.
    async fn rules(&self, zones: &[String], phase: ContainerPhase) -> EdgewardResult<Vec<RemoteRule>> {
        let mut rules = Vec::new();
        for zone in zones {
            let zone_id = self.api.resolve_zone(zone).await?;
            match self.api.find_container(&zone_id, phase).await? {
                Some(container) => rules.extend(self.api.list_rules(&zone_id, &container.id).await?),
                None => debug!(zone = %zone, phase = %phase, "no container, nothing to read"),
            }
        }
        Ok(rules)
    }

    pub async fn waf_view(&self, zones: &[String]) -> EdgewardResult<WafView> {
        let mut view = WafView::default();
        let mut unreadable = Unreadable::default();

        for rule in self.rules(zones, ContainerPhase::FirewallCustom).await? {
            let Some(category) = categorized(&rule, |c| {
                matches!(c, Category::BlacklistIp | Category::WhitelistIp | Category::Country)
            }) else {
                continue;
            };
            let Some(decoded) = unreadable.read(&rule) else { continue };

            if category == Category::Country {
                if let Some(c) = unreadable.find(&rule, &decoded, Field::IpSrcCountry) {
                    let access_mode = if c.operator == Operator::NotIn { AccessMode::Allow } else { AccessMode::Block };
                    view.country_list.insert(decoded.host, CountryView { access_mode, codes: c.value.items() });
                }
            } else if let Some(c) = unreadable.find(&rule, &decoded, Field::IpSrc) {
                let list = if category == Category::BlacklistIp {
                    &mut view.black_ip_list
                } else {
                    &mut view.white_ip_list
                };
                list.insert(decoded.host, c.value.items());
            }
        }

        view.skipped = unreadable.0;
        Ok(view)
    }

    pub async fn bot_view(&self, zones: &[String]) -> EdgewardResult<BotView> {
        let mut view = BotView::default();
        let mut unreadable = Unreadable::default();

        for rule in self.rules(zones, ContainerPhase::FirewallCustom).await? {
            let Some(category) = categorized(&rule, |c| matches!(c, Category::KnownBot | Category::VerifiedBot))
            else {
                continue;
            };
            let Some(decoded) = unreadable.read(&rule) else { continue };

            if category == Category::KnownBot {
                if let Some(c) = unreadable.find(&rule, &decoded, Field::BotKnown) {
                    let value = matches!(c.value, ConditionValue::Flag(true));
                    view.known_bot_list.insert(decoded.host, KnownBotView { value, action: rule.action.clone() });
                }
            } else if let Some(c) = unreadable.find(&rule, &decoded, Field::BotVerifiedCategory) {
                view.verified_category_list.insert(
                    decoded.host,
                    VerifiedBotView { operator: c.operator, value: c.value.items(), action: rule.action.clone() },
                );
            }
        }

        view.skipped = unreadable.0;
        Ok(view)
    }

    pub async fn custom_view(&self, zones: &[String]) -> EdgewardResult<CustomView> {
        let mut view = CustomView::default();
        let mut unreadable = Unreadable::default();

        for rule in self.rules(zones, ContainerPhase::FirewallCustom).await? {
            let Some(Category::Custom(field)) = categorized(&rule, |c| matches!(c, Category::Custom(_))) else {
                continue;
            };
            let Ok(decoded) = decompile(&rule.expression) else {
                unreadable.read(&rule);
                continue;
            };
            // Partial reads stay with the rule rather than the view-wide list.
            view.rules.entry(decoded.host.clone()).or_default().push(CustomRuleView {
                field,
                action: rule.action.clone(),
                conditions: decoded.conditions(),
                skipped: decoded.skipped,
            });
        }

        view.skipped = unreadable.0;
        Ok(view)
    }

    pub async fn cache_view(&self, zones: &[String]) -> EdgewardResult<CacheSettingsView> {
        let mut view = CacheSettingsView::default();
        let mut unreadable = Unreadable::default();

        for rule in self.rules(zones, ContainerPhase::CacheSettings).await? {
            if categorized(&rule, |c| c == Category::Cache).is_none() {
                continue;
            }
            let params = rule.action_parameters.clone().unwrap_or_default();
            let params: CacheParameters = match serde_json::from_value(params) {
                Ok(params) => params,
                Err(e) => {
                    unreadable.push(&rule, format!("unreadable cache parameters: {e}"), Vec::new());
                    continue;
                }
            };
            let Ok(decoded) = decompile(&rule.expression) else {
                unreadable.read(&rule);
                continue;
            };
            view.domains.insert(
                decoded.host.clone(),
                CacheView {
                    cache: params.cache,
                    browser_ttl: params.browser_ttl,
                    edge_ttl: params.edge_ttl,
                    conditions: decoded.conditions(),
                    skipped: decoded.skipped,
                },
            );
        }

        view.skipped = unreadable.0;
        Ok(view)
    }

    /// Zones without an override report the default level.
    pub async fn ddos_view(&self, zones: &[String]) -> EdgewardResult<DdosView> {
        let mut view = DdosView::new();
        for zone in zones {
            let rules = self.rules(std::slice::from_ref(zone), ContainerPhase::DdosL7).await?;
            let sensitivity = rules
                .iter()
                .find(|r| r.tag == DDOS_OVERRIDE_TAG)
                .and_then(|r| r.action_parameters.as_ref())
                .and_then(|p| p["overrides"]["sensitivity_level"].as_str())
                .map(Sensitivity::from_platform)
                .unwrap_or_default();
            view.insert(zone.clone(), sensitivity.level().to_string());
        }
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_audit::InMemoryJournal;
    use edgeward_contracts::{
        condition::LogicalOperator,
        payload::{
            CacheRequest, CdnCache, CountryEntry, CountryRequest, CustomPolicyRequest, CustomRule, DdosRequest,
            IpListRequest, KnownBotRequest, KnownBotRule, SubdomainRef, TtlRequest, VerifiedBotRequest,
            VerifiedBotRule,
        },
    };
    use edgeward_core::InMemoryZoneApi;
    use serde_json::json;

    use crate::apply::PolicyService;

    const ZONE: &str = "example.com";
    const HOST: &str = "a.example.com";

    fn zones() -> Vec<String> {
        vec![ZONE.to_string()]
    }

    fn platform() -> InMemoryZoneApi {
        let api = InMemoryZoneApi::new();
        api.add_zone(ZONE, "z1").unwrap();
        api
    }

    fn subs() -> Vec<SubdomainRef> {
        vec![SubdomainRef { zone: ZONE.into(), name: HOST.into() }]
    }

    fn seeded(tag: &str, expression: &str) -> RemoteRule {
        RemoteRule {
            id: format!("seed-{tag}"),
            tag: tag.into(),
            expression: expression.into(),
            action: RuleAction::Block,
            enabled: true,
            action_parameters: None,
            logging: None,
        }
    }

    #[tokio::test]
    async fn waf_view_reads_back_applied_lists() {
        let api = platform();
        let journal = InMemoryJournal::new("view-test");
        let service = PolicyService::new(&api, &journal);
        let ips = |list: &[&str]| IpListRequest {
            subdomains: subs(),
            ip_list: list.iter().map(|s| s.to_string()).collect(),
        };
        service.apply_blacklist(&ips(&["1.2.3.4", "10.0.0.0/8"])).await.unwrap();
        service.apply_whitelist(&ips(&["5.6.7.8"])).await.unwrap();
        service
            .apply_country(&CountryRequest {
                subdomains: subs(),
                country_list: vec![CountryEntry { code: "CN".into(), name: None }],
                country_access_mode: AccessMode::Allow,
            })
            .await
            .unwrap();

        let view = PolicyReader::new(&api).waf_view(&zones()).await.unwrap();

        assert_eq!(view.black_ip_list[HOST], vec!["1.2.3.4", "10.0.0.0/8"]);
        assert_eq!(view.white_ip_list[HOST], vec!["5.6.7.8"]);
        assert_eq!(view.country_list[HOST], CountryView { access_mode: AccessMode::Allow, codes: vec!["CN".into()] });
        assert!(view.skipped.is_empty());
    }

    #[tokio::test]
    async fn waf_view_lists_hand_edited_rule_as_skipped() {
        let api = platform();
        api.add_container("z1", "fw", ContainerPhase::FirewallCustom).unwrap();
        api.seed_rule("z1", "fw", seeded("black_ip_a.example.com", r#"((ip.src in {1.1.1.1}) and http.host eq "a.example.com")"#))
            .unwrap();
        api.seed_rule("z1", "fw", seeded("hand made", "ip.src in {9.9.9.9}")).unwrap();

        let view = PolicyReader::new(&api).waf_view(&zones()).await.unwrap();

        assert!(view.black_ip_list.is_empty());
        assert_eq!(view.skipped.len(), 1);
        assert_eq!(view.skipped[0].tag, "black_ip_a.example.com");
    }

    #[tokio::test]
    async fn bot_view_reports_operator_as_type() {
        let api = platform();
        let journal = InMemoryJournal::new("view-test");
        let service = PolicyService::new(&api, &journal);
        service
            .apply_known_bot(&KnownBotRequest {
                subdomains: subs(),
                known_bot_rule: Some(KnownBotRule { value: false, action: RuleAction::Block }),
            })
            .await
            .unwrap();
        service
            .apply_verified_bot(&VerifiedBotRequest {
                subdomains: subs(),
                verified_bot_rule: Some(VerifiedBotRule {
                    operator: Operator::NotIn,
                    value: vec!["Search Engine Crawler".into(), "Monitoring & Analytics".into()],
                    action: RuleAction::Skip,
                }),
            })
            .await
            .unwrap();

        let view = PolicyReader::new(&api).bot_view(&zones()).await.unwrap();

        assert_eq!(view.known_bot_list[HOST], KnownBotView { value: false, action: RuleAction::Block });
        let verified = &view.verified_category_list[HOST];
        assert_eq!(verified.operator, Operator::NotIn);
        assert_eq!(verified.value.len(), 2);
        assert_eq!(verified.action, RuleAction::Skip);
        assert_eq!(serde_json::to_value(verified).unwrap()["type"], json!(Operator::NotIn));
    }

    #[tokio::test]
    async fn custom_view_returns_flat_conditions_per_domain() {
        let api = platform();
        let journal = InMemoryJournal::new("view-test");
        let conditions = vec![
            Condition::new(Field::FullUri, Operator::Contains, "/admin"),
            Condition::header("x-env", Operator::Eq, "dev").joined(LogicalOperator::And),
            Condition::new(Field::FullUri, Operator::StartsWith, "/debug").joined(LogicalOperator::Or),
        ];
        PolicyService::new(&api, &journal)
            .apply_custom(&CustomPolicyRequest {
                subdomains: subs(),
                custom_rule_list: vec![CustomRule { action: RuleAction::Block, conditions: conditions.clone() }],
            })
            .await
            .unwrap();

        let view = PolicyReader::new(&api).custom_view(&zones()).await.unwrap();

        let rules = &view.rules[HOST];
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].field, CustomField::FullUri);
        assert_eq!(rules[0].conditions, conditions);
        assert!(rules[0].skipped.is_empty());
    }

    #[tokio::test]
    async fn custom_view_keeps_unrecognized_clauses_with_the_rule() {
        let api = platform();
        api.add_container("z1", "fw", ContainerPhase::FirewallCustom).unwrap();
        api.seed_rule(
            "z1",
            "fw",
            seeded(
                "full_uri_a.example.com",
                r#"(http.request.full_uri contains "/x" and cf.threat_score gt 10 and http.host eq "a.example.com")"#,
            ),
        )
        .unwrap();

        let view = PolicyReader::new(&api).custom_view(&zones()).await.unwrap();

        let rule = &view.rules[HOST][0];
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.skipped.len(), 1);
        assert_eq!(rule.skipped[0].raw, "cf.threat_score gt 10");
    }

    #[tokio::test]
    async fn cache_view_reads_parameters_and_conditions() {
        let api = platform();
        let journal = InMemoryJournal::new("view-test");
        PolicyService::new(&api, &journal)
            .apply_cache(&CacheRequest {
                name: HOST.into(),
                zone: ZONE.into(),
                cdn_cache: CdnCache {
                    cache: true,
                    browser_ttl: TtlRequest { mode: "respect_origin".into(), default: None },
                    edge_ttl: TtlRequest { mode: "override_origin".into(), default: Some(7200) },
                    conditions: vec![],
                },
            })
            .await
            .unwrap();

        let view = PolicyReader::new(&api).cache_view(&zones()).await.unwrap();

        let cache = &view.domains[HOST];
        assert!(cache.cache);
        assert_eq!(cache.edge_ttl, Some(TtlSetting::new("override_origin", Some(7200))));
        assert!(cache.conditions.is_empty());
    }

    #[tokio::test]
    async fn ddos_view_defaults_without_override() {
        let api = platform();
        api.add_zone("other.org", "z2").unwrap();
        let journal = InMemoryJournal::new("view-test");
        PolicyService::new(&api, &journal)
            .apply_ddos(&DdosRequest { zone: ZONE.into(), sensitivity_level: "2".into() })
            .await
            .unwrap();

        let view = PolicyReader::new(&api)
            .ddos_view(&[ZONE.to_string(), "other.org".to_string()])
            .await
            .unwrap();

        assert_eq!(view[ZONE], "2");
        assert_eq!(view["other.org"], "3");
    }

    #[tokio::test]
    async fn views_do_not_mutate() {
        let api = platform();
        let reader = PolicyReader::new(&api);

        reader.waf_view(&zones()).await.unwrap();
        reader.cache_view(&zones()).await.unwrap();
        reader.ddos_view(&zones()).await.unwrap();

        assert_eq!(api.rule_mutations().unwrap(), 0);
        assert!(api.container_ids("z1", ContainerPhase::FirewallCustom).unwrap().is_empty());
    }
}
