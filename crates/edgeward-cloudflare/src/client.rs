//! `ZoneRuleApi` over the Cloudflare v4 rulesets API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/zones?name={name}` | Resolve zone |
//! | GET    | `/zones/{zone}/rulesets` | List containers |
//! | POST   | `/zones/{zone}/rulesets` | Create container |
//! | GET    | `/zones/{zone}/rulesets/{ruleset}` | Container with rules |
//! | POST   | `/zones/{zone}/rulesets/{ruleset}/rules` | Create rule |
//! | PATCH  | `/zones/{zone}/rulesets/{ruleset}/rules/{rule}` | Patch rule |
//! | DELETE | `/zones/{zone}/rulesets/{ruleset}/rules/{rule}` | Delete rule |
//!
//! Every response is wrapped in the `{success, errors, result}` envelope.
//! Rule mutations return the whole updated ruleset, not the rule.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use edgeward_contracts::{
    error::{EdgewardError, EdgewardResult},
    remote::{ContainerPhase, ContainerSummary, RemoteRule, RuleBody, RulesetSnapshot},
};
use edgeward_core::traits::ZoneRuleApi;

use crate::{config::CloudflareConfig, retry::retry_send};

// -- Envelope -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneSummary {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateRulesetRequest<'a> {
    name: &'a str,
    description: &'a str,
    kind: &'a str,
    phase: &'a str,
}

/// First `errors[].message` of an envelope body, if it has one.
fn envelope_message(body: &str) -> Option<String> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_str(body).ok()?;
    let first = envelope.errors.into_iter().next()?;
    match first.code {
        Some(code) if !first.message.is_empty() => Some(format!("{} (code {code})", first.message)),
        _ if !first.message.is_empty() => Some(first.message),
        _ => None,
    }
}

// -- Client -------------------------------------------------------------------

/// HTTP client for one Cloudflare account.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    api_root: String,
    max_retries: u32,
}

impl CloudflareClient {
    pub fn new(config: CloudflareConfig) -> EdgewardResult<Self> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.api_token)).map_err(|_| {
            EdgewardError::ConfigError {
                reason: "API token contains characters not allowed in a header".to_string(),
            }
        })?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EdgewardError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_root: config.api_root(),
            max_retries: config.max_retries,
        })
    }

    /// Issue one call and return the raw body of a 2xx response.
    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> EdgewardResult<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let endpoint = format!("{method} {path}");
        let url = format!("{}{}", self.api_root, path);
        debug!(endpoint = %endpoint, "cloudflare request");

        let resp = retry_send(self.max_retries, || {
            let mut req = self.http.request(method.clone(), &url).query(query);
            if let Some(body) = body {
                req = req.json(body);
            }
            req.send()
        })
        .await
        .map_err(|e| EdgewardError::RemoteApi {
            endpoint: endpoint.clone(),
            status: None,
            message: e.to_string(),
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| EdgewardError::RemoteApi {
            endpoint: endpoint.clone(),
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let message = envelope_message(&text).unwrap_or_else(|| {
                if text.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    text.clone()
                }
            });
            debug!(endpoint = %endpoint, status = status.as_u16(), "cloudflare request rejected");
            return Err(EdgewardError::RemoteApi {
                endpoint,
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(text)
    }

    /// Issue one call and decode the envelope's `result`.
    async fn call<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> EdgewardResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let endpoint = format!("{method} {path}");
        let text = self.execute(method, path, query, body).await?;

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| EdgewardError::RemoteApi {
            endpoint: endpoint.clone(),
            status: None,
            message: format!("unexpected response shape: {e}"),
        })?;

        if envelope.success == Some(false) {
            let message = envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .find(|m| !m.is_empty())
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(EdgewardError::RemoteApi { endpoint, status: None, message });
        }

        envelope.result.ok_or_else(|| EdgewardError::RemoteApi {
            endpoint,
            status: None,
            message: "response carried no result".to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> EdgewardResult<T> {
        self.call::<T, ()>(Method::GET, path, query, None).await
    }
}

fn rules_path(zone_id: &str, container_id: &str) -> String {
    format!("/zones/{zone_id}/rulesets/{container_id}/rules")
}

/// Pick a rule out of an updated ruleset returned by a mutation.
fn rule_from_ruleset(
    ruleset: RulesetSnapshot,
    endpoint: &str,
    predicate: impl Fn(&RemoteRule) -> bool,
) -> EdgewardResult<RemoteRule> {
    ruleset
        .rules
        .into_iter()
        .find(predicate)
        .ok_or_else(|| EdgewardError::RemoteApi {
            endpoint: endpoint.to_string(),
            status: None,
            message: "mutated rule missing from the returned ruleset".to_string(),
        })
}

#[async_trait]
impl ZoneRuleApi for CloudflareClient {
    async fn resolve_zone(&self, zone_name: &str) -> EdgewardResult<String> {
        let zones: Vec<ZoneSummary> = self.get("/zones", &[("name", zone_name)]).await?;
        let zone = zones.into_iter().next().ok_or_else(|| EdgewardError::ZoneNotFound {
            zone: zone_name.to_string(),
        })?;
        debug!(zone = zone_name, zone_id = %zone.id, "zone resolved");
        Ok(zone.id)
    }

    async fn list_containers(&self, zone_id: &str) -> EdgewardResult<Vec<ContainerSummary>> {
        self.get(&format!("/zones/{zone_id}/rulesets"), &[]).await
    }

    async fn create_container(&self, zone_id: &str, phase: ContainerPhase) -> EdgewardResult<ContainerSummary> {
        let request = CreateRulesetRequest {
            name: phase.ruleset_name(),
            description: phase.ruleset_description(),
            kind: "zone",
            phase: phase.as_str(),
        };
        let created: ContainerSummary = self
            .call(Method::POST, &format!("/zones/{zone_id}/rulesets"), &[], Some(&request))
            .await?;
        debug!(zone_id, container_id = %created.id, phase = %phase, "container created");
        Ok(created)
    }

    async fn get_rule_detail(&self, zone_id: &str, container_id: &str) -> EdgewardResult<RulesetSnapshot> {
        self.get(&format!("/zones/{zone_id}/rulesets/{container_id}"), &[]).await
    }

    async fn create_rule(&self, zone_id: &str, container_id: &str, body: &RuleBody) -> EdgewardResult<RemoteRule> {
        let path = rules_path(zone_id, container_id);
        let ruleset: RulesetSnapshot = self.call(Method::POST, &path, &[], Some(body)).await?;
        rule_from_ruleset(ruleset, &format!("POST {path}"), |r| r.tag == body.description)
    }

    async fn patch_rule(
        &self,
        zone_id: &str,
        container_id: &str,
        rule_id: &str,
        body: &RuleBody,
    ) -> EdgewardResult<RemoteRule> {
        let path = format!("{}/{rule_id}", rules_path(zone_id, container_id));
        let ruleset: RulesetSnapshot = self.call(Method::PATCH, &path, &[], Some(body)).await?;
        rule_from_ruleset(ruleset, &format!("PATCH {path}"), |r| r.id == rule_id)
    }

    async fn delete_rule(&self, zone_id: &str, container_id: &str, rule_id: &str) -> EdgewardResult<()> {
        let path = format!("{}/{rule_id}", rules_path(zone_id, container_id));
        self.execute::<()>(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_message_takes_first_error() {
        let body = r#"{"success":false,"errors":[{"code":10014,"message":"filter parse error"},{"message":"second"}],"result":null}"#;
        assert_eq!(envelope_message(body).as_deref(), Some("filter parse error (code 10014)"));
    }

    #[test]
    fn envelope_message_without_code() {
        let body = r#"{"errors":[{"message":"rate limited"}]}"#;
        assert_eq!(envelope_message(body).as_deref(), Some("rate limited"));
    }

    #[test]
    fn non_envelope_body_has_no_message() {
        assert_eq!(envelope_message("<html>bad gateway</html>"), None);
        assert_eq!(envelope_message(r#"{"errors":[]}"#), None);
    }
}
