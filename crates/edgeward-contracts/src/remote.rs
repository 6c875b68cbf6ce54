//! Wire types of the remote rule containers.

use serde::{Deserialize, Serialize};

use crate::policy::RuleAction;

/// Evaluation phase of a shared rule container. One container per zone per
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerPhase {
    #[serde(rename = "http_request_firewall_custom")]
    FirewallCustom,
    #[serde(rename = "http_request_cache_settings")]
    CacheSettings,
    #[serde(rename = "ddos_l7")]
    DdosL7,
}

impl ContainerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerPhase::FirewallCustom => "http_request_firewall_custom",
            ContainerPhase::CacheSettings => "http_request_cache_settings",
            ContainerPhase::DdosL7 => "ddos_l7",
        }
    }

    /// Name given to the container when it is provisioned.
    pub fn ruleset_name(&self) -> &'static str {
        match self {
            ContainerPhase::FirewallCustom => "firewall_custom",
            ContainerPhase::CacheSettings => "cache_purge",
            ContainerPhase::DdosL7 => "ddos_l7",
        }
    }

    pub fn ruleset_description(&self) -> &'static str {
        match self {
            ContainerPhase::FirewallCustom => "Custom firewall Ruleset",
            ContainerPhase::CacheSettings => "Cache settings Ruleset",
            ContainerPhase::DdosL7 => "DDoS L7 override Ruleset",
        }
    }
}

impl std::fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `logging` block of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLogging {
    pub enabled: bool,
}

/// Relative placement hint, accepted only on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePosition {
    Before(String),
    After(String),
}

fn default_enabled() -> bool {
    true
}

/// A rule as it exists on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRule {
    pub id: String,

    /// The identity tag, carried in the `description` field.
    #[serde(rename = "description", default)]
    pub tag: String,

    #[serde(default)]
    pub expression: String,

    pub action: RuleAction,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_parameters: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<RuleLogging>,
}

/// Body of a create or patch call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleBody {
    pub description: String,
    pub action: RuleAction,
    pub expression: String,
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_parameters: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<RuleLogging>,

    /// Only honored by create; the reconciler never sets it on patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<RulePosition>,
}

/// A container as returned by the list call (no rules).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub kind: String,
}

/// The ordered rules currently present in one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub rules: Vec<RemoteRule>,
}
