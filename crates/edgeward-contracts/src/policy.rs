//! Policy categories, rule actions and desired-state rules.
//!
//! A `PolicyRule` is the structured desired state for one (category, domain)
//! pair. The compiler turns it into a `DesiredRule`, which is what the
//! reconciler compares against the remote container.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    condition::{ConditionGroup, Field},
    error::{EdgewardError, EdgewardResult},
    remote::{ContainerPhase, RuleLogging},
};

/// Description of the zone-wide DDoS override rule.
pub const DDOS_OVERRIDE_TAG: &str = "default_rule";

/// Managed ruleset id the DDoS override rule executes.
pub const DDOS_MANAGED_RULESET_ID: &str = "4d21379b4f9f4bb088e0729962c8b3cf";

/// Phase skipped by `skip` rules.
pub const MANAGED_FIREWALL_PHASE: &str = "http_request_firewall_managed";

/// Field a custom rule is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomField {
    Header,
    FullUri,
    UserAgent,
}

impl CustomField {
    pub const ALL: [CustomField; 3] = [CustomField::UserAgent, CustomField::Header, CustomField::FullUri];

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomField::Header => "header",
            CustomField::FullUri => "full_uri",
            CustomField::UserAgent => "user_agent",
        }
    }

    /// The custom-rule key for a condition field, if it has one.
    pub fn from_field(field: &Field) -> Option<Self> {
        match field {
            Field::Header => Some(CustomField::Header),
            Field::FullUri => Some(CustomField::FullUri),
            Field::Generic(name) if name == "user_agent" => Some(CustomField::UserAgent),
            _ => None,
        }
    }
}

/// One policy concern. Each category owns at most one rule per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BlacklistIp,
    WhitelistIp,
    Country,
    KnownBot,
    VerifiedBot,
    Custom(CustomField),
    Cache,
    DdosOverride,
}

impl Category {
    /// Categories whose tag is `<prefix>_<domain>`, in prefix lookup order.
    const TAGGED: [Category; 9] = [
        Category::BlacklistIp,
        Category::WhitelistIp,
        Category::Country,
        Category::KnownBot,
        Category::VerifiedBot,
        Category::Cache,
        Category::Custom(CustomField::Header),
        Category::Custom(CustomField::FullUri),
        Category::Custom(CustomField::UserAgent),
    ];

    /// The description prefix deployed for this category.
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            Category::BlacklistIp => "black_ip",
            Category::WhitelistIp => "white_ip",
            Category::Country => "country",
            Category::KnownBot => "known_bot",
            Category::VerifiedBot => "verified_bot",
            Category::Custom(field) => field.as_str(),
            Category::Cache => "cache",
            Category::DdosOverride => DDOS_OVERRIDE_TAG,
        }
    }

    /// The identity tag of this category's rule for `domain`.
    ///
    /// The DDoS override is zone-wide, so its tag ignores the domain.
    pub fn tag(&self, domain: &str) -> String {
        match self {
            Category::DdosOverride => DDOS_OVERRIDE_TAG.to_string(),
            other => format!("{}_{}", other.tag_prefix(), domain),
        }
    }

    /// True if `tag` belongs to this category (for any domain).
    pub fn owns_tag(&self, tag: &str) -> bool {
        match self {
            Category::DdosOverride => tag == DDOS_OVERRIDE_TAG,
            other => tag
                .strip_prefix(other.tag_prefix())
                .is_some_and(|rest| rest.starts_with('_')),
        }
    }

    /// Split a remote description into its category and domain.
    pub fn parse_tag(tag: &str) -> Option<(Category, &str)> {
        if tag == DDOS_OVERRIDE_TAG {
            return Some((Category::DdosOverride, ""));
        }
        Self::TAGGED.iter().find_map(|category| {
            tag.strip_prefix(category.tag_prefix())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|domain| !domain.is_empty())
                .map(|domain| (*category, domain))
        })
    }

    /// The shared container this category's rules live in.
    pub fn phase(&self) -> ContainerPhase {
        match self {
            Category::Cache => ContainerPhase::CacheSettings,
            Category::DdosOverride => ContainerPhase::DdosL7,
            _ => ContainerPhase::FirewallCustom,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Custom(field) => write!(f, "custom:{}", field.as_str()),
            other => f.write_str(other.tag_prefix()),
        }
    }
}

/// What the platform does when a rule matches.
///
/// Actions outside the catalog are preserved verbatim in `Other` so a
/// container holding hand-made rules still deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleAction {
    Block,
    Skip,
    Log,
    Execute,
    SetCacheSettings,
    Other(String),
}

impl RuleAction {
    pub fn as_str(&self) -> &str {
        match self {
            RuleAction::Block => "block",
            RuleAction::Skip => "skip",
            RuleAction::Log => "log",
            RuleAction::Execute => "execute",
            RuleAction::SetCacheSettings => "set_cache_settings",
            RuleAction::Other(s) => s,
        }
    }
}

impl From<String> for RuleAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "block" => RuleAction::Block,
            "skip" => RuleAction::Skip,
            "log" => RuleAction::Log,
            "execute" => RuleAction::Execute,
            "set_cache_settings" => RuleAction::SetCacheSettings,
            _ => RuleAction::Other(s),
        }
    }
}

impl From<RuleAction> for String {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `action_parameters` of a `skip` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipParameters {
    pub phases: Vec<String>,
    pub ruleset: String,
}

impl Default for SkipParameters {
    fn default() -> Self {
        Self {
            phases: vec![MANAGED_FIREWALL_PHASE.to_string()],
            ruleset: "current".to_string(),
        }
    }
}

/// A browser or edge TTL setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlSetting {
    pub mode: String,
    /// Seconds; only sent for `override_origin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u64>,
}

impl TtlSetting {
    pub const OVERRIDE_ORIGIN: &'static str = "override_origin";

    /// Normalize: drop `default` unless the mode overrides the origin.
    pub fn new(mode: impl Into<String>, default: Option<u64>) -> Self {
        let mode = mode.into();
        let default = if mode == Self::OVERRIDE_ORIGIN { default } else { None };
        Self { mode, default }
    }
}

/// `action_parameters` of a `set_cache_settings` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheParameters {
    pub cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_ttl: Option<TtlSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_ttl: Option<TtlSetting>,
}

impl CacheParameters {
    /// TTLs are only sent when caching is on.
    pub fn new(cache: bool, browser_ttl: TtlSetting, edge_ttl: TtlSetting) -> Self {
        if cache {
            Self { cache, browser_ttl: Some(browser_ttl), edge_ttl: Some(edge_ttl) }
        } else {
            Self { cache, browser_ttl: None, edge_ttl: None }
        }
    }
}

/// DDoS L7 sensitivity, as exposed to the UI (`"3"`, `"2"`, `"1"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[default]
    Default,
    Medium,
    Low,
}

impl Sensitivity {
    /// Map a UI level; anything unknown is `Default`.
    pub fn from_level(level: &str) -> Self {
        match level {
            "2" => Sensitivity::Medium,
            "1" => Sensitivity::Low,
            _ => Sensitivity::Default,
        }
    }

    /// Map a platform value; anything unknown is `Default`.
    pub fn from_platform(value: &str) -> Self {
        match value {
            "medium" => Sensitivity::Medium,
            "low" => Sensitivity::Low,
            _ => Sensitivity::Default,
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            Sensitivity::Default => "3",
            Sensitivity::Medium => "2",
            Sensitivity::Low => "1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Default => "default",
            Sensitivity::Medium => "medium",
            Sensitivity::Low => "low",
        }
    }

    /// The `action_parameters` of the zone's DDoS override rule.
    pub fn action_parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "id": DDOS_MANAGED_RULESET_ID,
            "overrides": { "sensitivity_level": self.as_str() },
        })
    }
}

/// Structured desired state for one (category, domain) pair.
///
/// `groups` are OR-ed. An empty list means "no policy": the rule is deleted
/// if present, except for `Cache`, where it means "host only".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRule {
    pub category: Category,
    pub domain: String,
    pub action: RuleAction,
    pub groups: Vec<ConditionGroup>,
    pub action_parameters: Option<serde_json::Value>,
}

impl PolicyRule {
    pub fn new(category: Category, domain: impl Into<String>, action: RuleAction) -> Self {
        Self {
            category,
            domain: domain.into(),
            action,
            groups: Vec::new(),
            action_parameters: None,
        }
    }

    pub fn with_groups(mut self, groups: Vec<ConditionGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_parameters(mut self, params: serde_json::Value) -> Self {
        self.action_parameters = Some(params);
        self
    }

    pub fn tag(&self) -> String {
        self.category.tag(&self.domain)
    }
}

/// The compiled body a rule should carry on the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredBody {
    pub action: RuleAction,
    pub expression: String,
    pub enabled: bool,
    pub action_parameters: Option<serde_json::Value>,
    pub logging: Option<RuleLogging>,
}

/// Compiled desired state: what the reconciler converges a tag towards.
///
/// `body = None` means the tagged rule must not exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredRule {
    pub category: Category,
    pub domain: String,
    pub body: Option<DesiredBody>,
}

impl DesiredRule {
    /// A rule that must exist with the given action and expression.
    pub fn present(
        category: Category,
        domain: impl Into<String>,
        action: RuleAction,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            category,
            domain: domain.into(),
            body: Some(DesiredBody {
                action,
                expression: expression.into(),
                enabled: true,
                action_parameters: None,
                logging: None,
            }),
        }
    }

    /// A rule that must not exist.
    pub fn absent(category: Category, domain: impl Into<String>) -> Self {
        Self { category, domain: domain.into(), body: None }
    }

    /// Attach `action_parameters`. No-op on an absent rule.
    pub fn with_parameters(mut self, params: Option<serde_json::Value>) -> Self {
        if let Some(body) = self.body.as_mut() {
            body.action_parameters = params;
        }
        self
    }

    /// Attach a logging override. No-op on an absent rule.
    pub fn with_logging(mut self, logging: RuleLogging) -> Self {
        if let Some(body) = self.body.as_mut() {
            body.logging = Some(logging);
        }
        self
    }

    pub fn tag(&self) -> String {
        self.category.tag(&self.domain)
    }
}

/// `action_parameters` for a caller-chosen action: the managed-phase skip
/// for `skip`, nothing otherwise.
pub fn default_parameters(action: &RuleAction) -> EdgewardResult<Option<serde_json::Value>> {
    match action {
        RuleAction::Skip => serde_json::to_value(SkipParameters::default())
            .map(Some)
            .map_err(|e| EdgewardError::InvalidPayload {
                reason: format!("failed to encode skip parameters: {e}"),
            }),
        _ => Ok(None),
    }
}
