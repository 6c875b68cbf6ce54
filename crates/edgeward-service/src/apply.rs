//! Applying desired-state payloads.
//!
//! Every payload names one or more subdomains. For each subdomain entry the
//! zone is resolved, the desired rules for that host are built and the
//! reconciler converges them, one after the other. The first failure stops
//! the run; subdomains already processed keep their changes.

use serde::Serialize;
use tracing::{info, warn};

use edgeward_contracts::{
    change::ReconcileOutcome,
    error::{EdgewardError, EdgewardResult},
    payload::{
        CacheRequest, CountryRequest, CustomPolicyRequest, DdosRequest, IpListRequest, KnownBotRequest,
        SubdomainDeleteRequest, SubdomainRef, VerifiedBotRequest,
    },
    policy::DesiredRule,
};
use edgeward_core::{
    traits::{ChangeJournal, ZoneRuleApi},
    Reconciler,
};

use crate::desired;

/// Outcome of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagOutcome {
    pub tag: String,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

/// Everything one subdomain entry changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainReport {
    pub zone: String,
    pub zone_id: String,
    pub domain: String,
    pub outcomes: Vec<TagOutcome>,
}

impl DomainReport {
    /// Number of create, patch and delete calls issued for this domain.
    pub fn mutations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_mutation()).count()
    }
}

/// Runs desired-state payloads against a platform.
///
/// Each `apply_*` call is one reconciler run with its own run id.
pub struct PolicyService<'a> {
    api: &'a dyn ZoneRuleApi,
    journal: &'a dyn ChangeJournal,
}

impl<'a> PolicyService<'a> {
    pub fn new(api: &'a dyn ZoneRuleApi, journal: &'a dyn ChangeJournal) -> Self {
        Self { api, journal }
    }

    pub async fn apply_blacklist(&self, request: &IpListRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            Ok(vec![desired::blacklist(domain, &request.ip_list)?])
        })
        .await
    }

    pub async fn apply_whitelist(&self, request: &IpListRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            Ok(vec![desired::whitelist(domain, &request.ip_list)?])
        })
        .await
    }

    pub async fn apply_country(&self, request: &CountryRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            Ok(vec![desired::country(
                domain,
                &request.country_list,
                request.country_access_mode,
            )?])
        })
        .await
    }

    pub async fn apply_known_bot(&self, request: &KnownBotRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            Ok(vec![desired::known_bot(domain, request.known_bot_rule.as_ref())?])
        })
        .await
    }

    pub async fn apply_verified_bot(&self, request: &VerifiedBotRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            Ok(vec![desired::verified_bot(domain, request.verified_bot_rule.as_ref())?])
        })
        .await
    }

    /// Converge all three custom fields of every listed subdomain.
    pub async fn apply_custom(&self, request: &CustomPolicyRequest) -> EdgewardResult<Vec<DomainReport>> {
        request.validate()?;
        self.per_subdomain(&request.subdomains, |domain| {
            desired::custom(domain, &request.custom_rule_list)
        })
        .await
    }

    pub async fn apply_cache(&self, request: &CacheRequest) -> EdgewardResult<DomainReport> {
        request.validate()?;
        let target = SubdomainRef { zone: request.zone.clone(), name: request.name.clone() };
        let rule = desired::cache(&request.name, &request.cdn_cache)?;
        self.converge(&Reconciler::new(self.api, self.journal), &target, &[rule]).await
    }

    /// Set the zone-wide DDoS sensitivity. The report's `domain` is the zone.
    pub async fn apply_ddos(&self, request: &DdosRequest) -> EdgewardResult<DomainReport> {
        if request.zone.trim().is_empty() {
            return Err(EdgewardError::InvalidPayload {
                reason: "DDoS request needs a zone".to_string(),
            });
        }
        let target = SubdomainRef { zone: request.zone.clone(), name: request.zone.clone() };
        let rule = desired::ddos(&request.zone, &request.sensitivity_level)?;
        self.converge(&Reconciler::new(self.api, self.journal), &target, &[rule]).await
    }

    /// Remove the IP, country and cache rules of deleted subdomains.
    pub async fn delete_subdomains(&self, request: &SubdomainDeleteRequest) -> EdgewardResult<Vec<DomainReport>> {
        self.per_subdomain(&request.subdomains, |domain| Ok(desired::teardown(domain)))
            .await
    }

    async fn per_subdomain<F>(&self, subdomains: &[SubdomainRef], build: F) -> EdgewardResult<Vec<DomainReport>>
    where
        F: Fn(&str) -> EdgewardResult<Vec<DesiredRule>>,
    {
        // Build everything first so a bad payload mutates nothing.
        let planned = subdomains
            .iter()
            .map(|sub| Ok((sub, build(&sub.name)?)))
            .collect::<EdgewardResult<Vec<_>>>()?;

        let reconciler = Reconciler::new(self.api, self.journal);
        let mut reports = Vec::with_capacity(planned.len());
        for (sub, rules) in planned {
            reports.push(self.converge(&reconciler, sub, &rules).await?);
        }
        Ok(reports)
    }

    async fn converge(
        &self,
        reconciler: &Reconciler<'_>,
        target: &SubdomainRef,
        rules: &[DesiredRule],
    ) -> EdgewardResult<DomainReport> {
        let zone_id = self.api.resolve_zone(&target.zone).await?;

        let outcomes = reconciler.reconcile_all(&zone_id, rules).await.map_err(|e| {
            warn!(zone = %target.zone, domain = %target.name, error = %e, "domain reconciliation failed");
            e
        })?;

        let report = DomainReport {
            zone: target.zone.clone(),
            zone_id,
            domain: target.name.clone(),
            outcomes: rules
                .iter()
                .zip(outcomes)
                .map(|(rule, outcome)| TagOutcome { tag: rule.tag(), outcome })
                .collect(),
        };
        info!(
            run_id = %reconciler.run_id(),
            zone_id = %report.zone_id,
            domain = %report.domain,
            mutations = report.mutations(),
            "domain converged"
        );
        Ok(report)
    }
}
