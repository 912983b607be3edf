use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::escalation::EscalationPolicy;
use ember_core::ids::{IncidentId, RuleId};
use ember_core::incident::Incident;
use ember_ports::outbound::{EventPublisher, IncidentRepository, RuleRepository};

use crate::clock::Clock;
use crate::error::AppError;
use crate::incident_store::IncidentStore;
use crate::scheduler::PeriodicJob;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub escalated: usize,
    pub failed: usize,
}

/// Raises the severity of open incidents that outlive their escalation policy.
pub struct EscalationEngine<I, R, EP>
where
    I: IncidentRepository,
    R: RuleRepository,
    EP: EventPublisher,
{
    incidents: Arc<IncidentStore<I>>,
    rules: R,
    events: EP,
    default_policy: Option<EscalationPolicy>,
    clock: Arc<dyn Clock>,
}

impl<I, R, EP> EscalationEngine<I, R, EP>
where
    I: IncidentRepository,
    R: RuleRepository,
    EP: EventPublisher,
{
    pub fn new(
        incidents: Arc<IncidentStore<I>>,
        rules: R,
        events: EP,
        default_policy: Option<EscalationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            incidents,
            rules,
            events,
            default_policy,
            clock,
        }
    }

    /// One pass over open incidents. A failing incident is logged and
    /// counted; the rest of the scan continues.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<ScanReport, AppError> {
        let open = self.incidents.find_open().await?;
        let mut report = ScanReport::default();
        let mut rule_policies: HashMap<RuleId, Option<EscalationPolicy>> = HashMap::new();

        for candidate in &open {
            report.scanned += 1;
            match self
                .escalate_one(candidate.id(), &mut rule_policies, now)
                .await
            {
                Ok(true) => report.escalated += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(incident_id = %candidate.id(), error = %e, "escalation failed");
                }
            }
        }

        if report.escalated > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                escalated = report.escalated,
                failed = report.failed,
                "escalation scan"
            );
        }
        Ok(report)
    }

    /// Escalates one incident from a fresh read taken under its lock; the
    /// scan's snapshot may already be stale.
    async fn escalate_one(
        &self,
        id: &IncidentId,
        rule_policies: &mut HashMap<RuleId, Option<EscalationPolicy>>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let _held = self.incidents.acquire(id).await;
        let Some(mut incident) = self.incidents.load(id).await? else {
            return Ok(false);
        };
        if !incident.is_open() {
            return Ok(false);
        }
        let Some(policy) = self.policy_for(&incident, rule_policies).await? else {
            return Ok(false);
        };
        if !policy.is_due(incident.created_at(), incident.severity(), now) {
            return Ok(false);
        }

        let events = incident.escalate(policy.to_severity(), now)?;
        if events.is_empty() {
            return Ok(false);
        }
        self.incidents.save(&incident).await?;
        tracing::info!(
            incident_id = %incident.id(),
            to = %policy.to_severity(),
            "incident escalated"
        );
        if let Err(e) = self.events.publish(events).await {
            tracing::warn!(incident_id = %incident.id(), error = %e, "failed to publish escalation");
        }
        Ok(true)
    }

    /// Incident policy, else the origin rule's enabled policy, else the default.
    async fn policy_for(
        &self,
        incident: &Incident,
        rule_policies: &mut HashMap<RuleId, Option<EscalationPolicy>>,
    ) -> Result<Option<EscalationPolicy>, AppError> {
        if let Some(policy) = incident.escalation() {
            return Ok(Some(*policy));
        }
        if let Some(rule_id) = incident.rule_id() {
            let policy = match rule_policies.get(rule_id) {
                Some(cached) => *cached,
                None => {
                    let found = self
                        .rules
                        .find_by_id(&rule_id.to_string())
                        .await?
                        .map(|rule| *rule.escalation())
                        .filter(EscalationPolicy::enabled);
                    rule_policies.insert(rule_id.clone(), found);
                    found
                }
            };
            if policy.is_some() {
                return Ok(policy);
            }
        }
        Ok(self.default_policy)
    }
}

#[async_trait]
impl<I, R, EP> PeriodicJob for EscalationEngine<I, R, EP>
where
    I: IncidentRepository + 'static,
    R: RuleRepository + 'static,
    EP: EventPublisher + 'static,
{
    fn name(&self) -> &'static str {
        "escalation-scan"
    }

    async fn run(&self) {
        if let Err(e) = self.scan(self.clock.now()).await {
            tracing::error!(error = %e, "escalation scan failed");
        }
    }
}
