//! Desired-state request payloads.
//!
//! These are the JSON bodies the policy UI submits. Each one is validated
//! here and turned into `PolicyRule`s by `edgeward-service`.

use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    condition::{Condition, Operator},
    error::{EdgewardError, EdgewardResult},
    policy::{RuleAction, TtlSetting},
};

/// A host inside a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRef {
    /// Zone name, e.g. `example.com`.
    pub zone: String,
    /// Full host name, e.g. `api.example.com`.
    pub name: String,
}

fn require_subdomains(subdomains: &[SubdomainRef]) -> EdgewardResult<()> {
    if subdomains.is_empty() {
        return Err(EdgewardError::InvalidPayload {
            reason: "subdomains must not be empty".to_string(),
        });
    }
    if let Some(bad) = subdomains.iter().find(|s| s.zone.is_empty() || s.name.is_empty()) {
        return Err(EdgewardError::InvalidPayload {
            reason: format!("subdomain entry has an empty zone or name: {bad:?}"),
        });
    }
    Ok(())
}

/// Accepts an address (`1.2.3.4`, `::1`) or a CIDR block (`10.0.0.0/8`).
pub fn validate_ip(entry: &str) -> EdgewardResult<()> {
    let invalid = || EdgewardError::InvalidPayload {
        reason: format!("not an IP address or CIDR block: {entry:?}"),
    };
    let (addr, prefix) = match entry.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (entry, None),
    };
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    if let Some(prefix) = prefix {
        let bits: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if bits > max {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Blacklist or whitelist update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpListRequest {
    pub subdomains: Vec<SubdomainRef>,
    #[serde(alias = "blackIpList", alias = "whiteIpList", default)]
    pub ip_list: Vec<String>,
}

impl IpListRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        require_subdomains(&self.subdomains)?;
        self.ip_list.iter().try_for_each(|ip| validate_ip(ip))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryEntry {
    /// ISO 3166-1 alpha-2 code.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Whether listed countries are blocked, or everything else is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Block,
    #[serde(other)]
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRequest {
    pub subdomains: Vec<SubdomainRef>,
    #[serde(default)]
    pub country_list: Vec<CountryEntry>,
    #[serde(default)]
    pub country_access_mode: AccessMode,
}

impl CountryRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        require_subdomains(&self.subdomains)?;
        match self.country_list.iter().find(|c| c.code.trim().is_empty()) {
            Some(_) => Err(EdgewardError::InvalidPayload {
                reason: "country code must not be empty".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownBotRule {
    /// `true` matches known bots, `false` everything else.
    pub value: bool,
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownBotRequest {
    pub subdomains: Vec<SubdomainRef>,
    /// Absent means "no known-bot rule".
    #[serde(default)]
    pub known_bot_rule: Option<KnownBotRule>,
}

impl KnownBotRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        require_subdomains(&self.subdomains)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBotRule {
    #[serde(rename = "type")]
    pub operator: Operator,
    #[serde(default)]
    pub value: Vec<String>,
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedBotRequest {
    pub subdomains: Vec<SubdomainRef>,
    #[serde(default)]
    pub verified_bot_rule: Option<VerifiedBotRule>,
}

impl VerifiedBotRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        require_subdomains(&self.subdomains)?;
        match &self.verified_bot_rule {
            Some(rule)
                if !matches!(
                    rule.operator,
                    Operator::Eq | Operator::Ne | Operator::In | Operator::NotIn
                ) =>
            {
                Err(EdgewardError::InvalidPayload {
                    reason: format!("verified-bot rule does not support operator {}", rule.operator),
                })
            }
            _ => Ok(()),
        }
    }
}

/// One custom rule: an action over a flat, tagged condition list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub action: RuleAction,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPolicyRequest {
    pub subdomains: Vec<SubdomainRef>,
    #[serde(default)]
    pub custom_rule_list: Vec<CustomRule>,
}

impl CustomPolicyRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        require_subdomains(&self.subdomains)?;
        match self.custom_rule_list.iter().position(|r| r.conditions.is_empty()) {
            Some(i) => Err(EdgewardError::InvalidPayload {
                reason: format!("custom rule #{i} has no conditions"),
            }),
            None => Ok(()),
        }
    }
}

/// The UI sends booleans and numbers as strings at times.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(u64),
    Text(String),
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Loose::deserialize(deserializer)? {
        Loose::Bool(b) => Ok(b),
        Loose::Text(s) => Ok(s == "true"),
        Loose::Number(n) => Ok(n != 0),
    }
}

fn loose_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Number(n)) => Ok(Some(n)),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid TTL seconds: {s:?}"))),
        Some(Loose::Bool(_)) => Err(serde::de::Error::custom("TTL seconds cannot be a boolean")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlRequest {
    pub mode: String,
    #[serde(default, deserialize_with = "loose_seconds")]
    pub default: Option<u64>,
}

impl TtlRequest {
    pub fn to_setting(&self) -> TtlSetting {
        TtlSetting::new(self.mode.clone(), self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnCache {
    #[serde(deserialize_with = "loose_bool")]
    pub cache: bool,
    pub browser_ttl: TtlRequest,
    pub edge_ttl: TtlRequest,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Cache settings for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRequest {
    /// Host name.
    pub name: String,
    /// Zone name.
    pub zone: String,
    pub cdn_cache: CdnCache,
}

impl CacheRequest {
    pub fn validate(&self) -> EdgewardResult<()> {
        if self.name.is_empty() || self.zone.is_empty() {
            return Err(EdgewardError::InvalidPayload {
                reason: "cache request needs both name and zone".to_string(),
            });
        }
        let ttls = [&self.cdn_cache.browser_ttl, &self.cdn_cache.edge_ttl];
        if self.cdn_cache.cache {
            if let Some(ttl) = ttls
                .iter()
                .find(|t| t.mode == TtlSetting::OVERRIDE_ORIGIN && t.default.is_none())
            {
                return Err(EdgewardError::InvalidPayload {
                    reason: format!("TTL mode {} needs a default", ttl.mode),
                });
            }
        }
        Ok(())
    }
}

/// Zone-wide DDoS sensitivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdosRequest {
    pub zone: String,
    /// `"3"` (default), `"2"` (medium) or `"1"` (low).
    pub sensitivity_level: String,
}

/// Subdomain teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainDeleteRequest {
    pub subdomains: Vec<SubdomainRef>,
}
