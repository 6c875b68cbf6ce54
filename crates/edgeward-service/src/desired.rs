//! Desired rules for one domain, built from request payloads.
//!
//! Pure functions: nothing here talks to the platform. Each builder returns
//! the `DesiredRule`s the reconciler should converge for a single domain.

use edgeward_contracts::{
    condition::{Condition, ConditionGroup, ConditionValue, Field, Operator},
    error::{EdgewardError, EdgewardResult},
    payload::{AccessMode, CdnCache, CountryEntry, CustomRule, KnownBotRule, VerifiedBotRule},
    policy::{
        default_parameters, CacheParameters, Category, CustomField, DesiredRule, PolicyRule, RuleAction,
        Sensitivity, SkipParameters,
    },
    remote::RuleLogging,
};
use edgeward_expr::{compile_rule, partition};

fn single(condition: Condition) -> Vec<ConditionGroup> {
    ConditionGroup::new(vec![condition]).into_iter().collect()
}

fn with_action_defaults(rule: PolicyRule) -> EdgewardResult<PolicyRule> {
    Ok(match default_parameters(&rule.action)? {
        Some(params) => rule.with_parameters(params),
        None => rule,
    })
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> EdgewardResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| EdgewardError::InvalidPayload {
        reason: format!("failed to encode {what}: {e}"),
    })
}

fn ip_groups(ips: &[String]) -> Vec<ConditionGroup> {
    let ips: Vec<String> = ips.iter().map(|ip| ip.trim().to_string()).filter(|ip| !ip.is_empty()).collect();
    if ips.is_empty() {
        return Vec::new();
    }
    single(Condition::new(Field::IpSrc, Operator::In, ConditionValue::Many(ips)))
}

/// Block the listed addresses. An empty list removes the rule.
pub fn blacklist(domain: &str, ips: &[String]) -> EdgewardResult<DesiredRule> {
    compile_rule(&PolicyRule::new(Category::BlacklistIp, domain, RuleAction::Block).with_groups(ip_groups(ips)))
}

/// Let the listed addresses skip the managed firewall, with logging on.
pub fn whitelist(domain: &str, ips: &[String]) -> EdgewardResult<DesiredRule> {
    let rule = PolicyRule::new(Category::WhitelistIp, domain, RuleAction::Skip)
        .with_groups(ip_groups(ips))
        .with_parameters(encode(&SkipParameters::default(), "skip parameters")?);
    Ok(compile_rule(&rule)?.with_logging(RuleLogging { enabled: true }))
}

/// Geo block. `Block` blocks the listed countries; `Allow` blocks every
/// other country.
pub fn country(domain: &str, countries: &[CountryEntry], mode: AccessMode) -> EdgewardResult<DesiredRule> {
    let codes: Vec<String> = countries.iter().map(|c| c.code.trim().to_uppercase()).collect();
    let groups = if codes.is_empty() {
        Vec::new()
    } else {
        let operator = match mode {
            AccessMode::Block => Operator::In,
            AccessMode::Allow => Operator::NotIn,
        };
        single(Condition::new(Field::IpSrcCountry, operator, ConditionValue::Many(codes)))
    };
    compile_rule(&PolicyRule::new(Category::Country, domain, RuleAction::Block).with_groups(groups))
}

/// Known-bot rule. `None` removes it.
pub fn known_bot(domain: &str, rule: Option<&KnownBotRule>) -> EdgewardResult<DesiredRule> {
    let Some(rule) = rule else {
        return Ok(DesiredRule::absent(Category::KnownBot, domain));
    };
    let condition = Condition::new(Field::BotKnown, Operator::Eq, ConditionValue::Flag(rule.value));
    let policy = PolicyRule::new(Category::KnownBot, domain, rule.action.clone()).with_groups(single(condition));
    compile_rule(&with_action_defaults(policy)?)
}

/// Verified-bot category rule. `None` or an empty category list removes it.
pub fn verified_bot(domain: &str, rule: Option<&VerifiedBotRule>) -> EdgewardResult<DesiredRule> {
    let Some(rule) = rule.filter(|r| !r.value.is_empty()) else {
        return Ok(DesiredRule::absent(Category::VerifiedBot, domain));
    };
    let value = match rule.operator {
        Operator::Eq | Operator::Ne => ConditionValue::One(rule.value[0].clone()),
        _ => ConditionValue::Many(rule.value.clone()),
    };
    let condition = Condition::new(Field::BotVerifiedCategory, rule.operator, value);
    let policy = PolicyRule::new(Category::VerifiedBot, domain, rule.action.clone()).with_groups(single(condition));
    compile_rule(&with_action_defaults(policy)?)
}

/// Custom rules of one domain.
///
/// Each rule is keyed on the field of its first condition. Every custom
/// field the list does not mention is returned as absent, so the full set of
/// three is always converged.
pub fn custom(domain: &str, rules: &[CustomRule]) -> EdgewardResult<Vec<DesiredRule>> {
    let mut seen: Vec<CustomField> = Vec::with_capacity(CustomField::ALL.len());
    let mut desired = Vec::with_capacity(CustomField::ALL.len());

    for (i, rule) in rules.iter().enumerate() {
        let first = rule.conditions.first().ok_or_else(|| EdgewardError::InvalidPayload {
            reason: format!("custom rule #{i} has no conditions"),
        })?;
        let field = CustomField::from_field(&first.field).ok_or_else(|| EdgewardError::InvalidPayload {
            reason: format!(
                "custom rule #{i} must start with a header, full_uri or user_agent condition, not {}",
                first.field.as_str()
            ),
        })?;
        if seen.contains(&field) {
            return Err(EdgewardError::InvalidPayload {
                reason: format!("more than one custom rule keyed on {}", field.as_str()),
            });
        }
        seen.push(field);

        let policy = PolicyRule::new(Category::Custom(field), domain, rule.action.clone())
            .with_groups(partition(rule.conditions.clone()));
        desired.push(compile_rule(&with_action_defaults(policy)?)?);
    }

    desired.extend(
        CustomField::ALL
            .into_iter()
            .filter(|field| !seen.contains(field))
            .map(|field| DesiredRule::absent(Category::Custom(field), domain)),
    );
    Ok(desired)
}

/// Cache settings rule. Always present: without conditions it covers the
/// whole host.
pub fn cache(domain: &str, settings: &CdnCache) -> EdgewardResult<DesiredRule> {
    let params = CacheParameters::new(
        settings.cache,
        settings.browser_ttl.to_setting(),
        settings.edge_ttl.to_setting(),
    );
    let rule = PolicyRule::new(Category::Cache, domain, RuleAction::SetCacheSettings)
        .with_groups(partition(settings.conditions.clone()))
        .with_parameters(encode(&params, "cache parameters")?);
    compile_rule(&rule)
}

/// The zone-wide DDoS override. `zone` only labels the journal entry.
pub fn ddos(zone: &str, level: &str) -> EdgewardResult<DesiredRule> {
    let rule = PolicyRule::new(Category::DdosOverride, zone, RuleAction::Execute)
        .with_parameters(Sensitivity::from_level(level).action_parameters());
    compile_rule(&rule)
}

/// Everything a subdomain owns outside the custom rules.
pub fn teardown(domain: &str) -> Vec<DesiredRule> {
    [Category::BlacklistIp, Category::WhitelistIp, Category::Country, Category::Cache]
        .into_iter()
        .map(|category| DesiredRule::absent(category, domain))
        .collect()
}
