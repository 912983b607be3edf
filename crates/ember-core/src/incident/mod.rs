pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertGroup, RawAlert};
use crate::error::DomainError;
use crate::escalation::EscalationPolicy;
use crate::events::{
    DomainEvent, IncidentDismissed, IncidentEscalated, IncidentInvestigating, IncidentOpened,
    IncidentResolved, IncidentUpdated,
};
use crate::ids::{AlertId, IncidentId, RuleId};
use crate::severity::Severity;

pub use status::IncidentStatus;

/// Operator-facing unit of work built from one or more grouped alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    id: IncidentId,
    title: String,
    source: String,
    severity: Severity,
    status: IncidentStatus,
    impact: String,
    alert_count: u32,
    alert_ids: Vec<AlertId>,
    has_forge_analysis: bool,
    rule_id: Option<RuleId>,
    escalation: Option<EscalationPolicy>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    escalated_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Opens an incident for a group that just reached its alert threshold.
    pub fn open(group: &AlertGroup, now: DateTime<Utc>) -> (Self, Vec<DomainEvent>) {
        let source = group.source().to_string();
        let alert_count = group.len() as u32;
        let incident = Self {
            id: IncidentId::new(),
            title: format!("[{source}] {}", group.dominant_message()),
            impact: impact(alert_count, &source),
            source,
            severity: group.highest_severity(),
            status: IncidentStatus::Active,
            alert_count,
            alert_ids: group.alerts().iter().map(|a| a.id().clone()).collect(),
            has_forge_analysis: false,
            rule_id: group.alerts().iter().find_map(RawAlert::rule_id),
            escalation: None,
            created_at: now,
            updated_at: now,
            escalated_at: None,
            resolved_at: None,
        };
        let events = vec![DomainEvent::IncidentOpened(IncidentOpened {
            incident_id: incident.id.clone(),
            title: incident.title.clone(),
            severity: incident.severity,
            alert_count,
            occurred_at: now,
        })];
        (incident, events)
    }

    /// Folds one more alert in. Severity only ever goes up.
    pub fn record_alert(
        &mut self,
        alert: &RawAlert,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.ensure_open()?;
        self.alert_count += 1;
        self.alert_ids.push(alert.id().clone());
        if alert.severity() > self.severity {
            self.severity = alert.severity();
        }
        self.impact = impact(self.alert_count, &self.source);
        self.updated_at = now;
        Ok(vec![DomainEvent::IncidentUpdated(IncidentUpdated {
            incident_id: self.id.clone(),
            alert_id: alert.id().clone(),
            alert_count: self.alert_count,
            severity: self.severity,
            occurred_at: now,
        })])
    }

    /// Raises severity to `to` without touching status. No-op when the
    /// incident is already at or above `to`.
    pub fn escalate(
        &mut self,
        to: Severity,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.ensure_open()?;
        if to <= self.severity {
            return Ok(vec![]);
        }
        let from = self.severity;
        self.severity = to;
        self.escalated_at = Some(now);
        self.updated_at = now;
        Ok(vec![DomainEvent::IncidentEscalated(IncidentEscalated {
            incident_id: self.id.clone(),
            from,
            to,
            occurred_at: now,
        })])
    }

    pub fn investigate(&mut self, now: DateTime<Utc>) -> Result<Vec<DomainEvent>, DomainError> {
        match self.status {
            IncidentStatus::Investigating => Ok(vec![]),
            IncidentStatus::Active => {
                self.status = IncidentStatus::Investigating;
                self.updated_at = now;
                Ok(vec![DomainEvent::IncidentInvestigating(
                    IncidentInvestigating {
                        incident_id: self.id.clone(),
                        occurred_at: now,
                    },
                )])
            }
            IncidentStatus::Resolved | IncidentStatus::Dismissed => {
                Err(DomainError::IncidentClosed)
            }
        }
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<Vec<DomainEvent>, DomainError> {
        self.close(IncidentStatus::Resolved, now)?;
        Ok(vec![DomainEvent::IncidentResolved(IncidentResolved {
            incident_id: self.id.clone(),
            occurred_at: now,
        })])
    }

    pub fn dismiss(&mut self, now: DateTime<Utc>) -> Result<Vec<DomainEvent>, DomainError> {
        self.close(IncidentStatus::Dismissed, now)?;
        Ok(vec![DomainEvent::IncidentDismissed(IncidentDismissed {
            incident_id: self.id.clone(),
            occurred_at: now,
        })])
    }

    fn close(&mut self, status: IncidentStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.status = status;
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(DomainError::IncidentClosed)
        }
    }

    /// Incident-level policy, which takes precedence over the origin rule's.
    pub fn set_escalation(&mut self, policy: Option<EscalationPolicy>) {
        self.escalation = policy;
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn id(&self) -> &IncidentId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> IncidentStatus {
        self.status
    }

    pub fn impact(&self) -> &str {
        &self.impact
    }

    pub fn alert_count(&self) -> u32 {
        self.alert_count
    }

    pub fn alert_ids(&self) -> &[AlertId] {
        &self.alert_ids
    }

    pub fn has_forge_analysis(&self) -> bool {
        self.has_forge_analysis
    }

    pub fn rule_id(&self) -> Option<&RuleId> {
        self.rule_id.as_ref()
    }

    pub fn escalation(&self) -> Option<&EscalationPolicy> {
        self.escalation.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn escalated_at(&self) -> Option<DateTime<Utc>> {
        self.escalated_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }
}

fn impact(alert_count: u32, source: &str) -> String {
    if alert_count == 1 {
        format!("1 alert from {source}")
    } else {
        format!("{alert_count} alerts from {source}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{GroupingKey, GroupingPolicy, RULE_ID_LABEL};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn alert(message: &str, severity: Severity) -> RawAlert {
        RawAlert::new("api", message, severity, BTreeMap::new(), ts("2025-01-15T10:00:00Z"))
            .unwrap()
    }

    fn group_of(alerts: Vec<RawAlert>) -> AlertGroup {
        let mut it = alerts.into_iter();
        let first = it.next().unwrap();
        let key = GroupingKey::for_alert(&first, &GroupingPolicy::default());
        let mut group =
            AlertGroup::open(key, first, Duration::seconds(300), ts("2025-01-15T10:00:00Z"));
        for a in it {
            group.push(a);
        }
        group
    }

    fn open_incident(severity: Severity) -> Incident {
        let (incident, _) = Incident::open(
            &group_of(vec![alert("5xx spike", severity)]),
            ts("2025-01-15T10:00:00Z"),
        );
        incident
    }

    #[test]
    fn open_summarizes_group() {
        let group = group_of(vec![
            alert("5xx spike", Severity::Info),
            alert("5xx spike", Severity::Warning),
            alert("latency", Severity::Info),
        ]);
        let (incident, events) = Incident::open(&group, ts("2025-01-15T10:01:00Z"));

        assert_eq!(incident.title(), "[api] 5xx spike");
        assert_eq!(incident.alert_count(), 3);
        assert_eq!(incident.alert_ids().len(), 3);
        assert_eq!(incident.severity(), Severity::Warning);
        assert_eq!(incident.status(), IncidentStatus::Active);
        assert_eq!(incident.impact(), "3 alerts from api");
        assert!(!incident.has_forge_analysis());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "incident.opened");
    }

    #[test]
    fn open_picks_up_origin_rule() {
        let rule_id = RuleId::new();
        let labels = BTreeMap::from([(RULE_ID_LABEL.to_string(), rule_id.to_string())]);
        let a = RawAlert::new("api", "m", Severity::Info, labels, ts("2025-01-15T10:00:00Z"))
            .unwrap();
        let (incident, _) = Incident::open(&group_of(vec![a]), ts("2025-01-15T10:00:00Z"));
        assert_eq!(incident.rule_id(), Some(&rule_id));
    }

    #[test]
    fn record_alert_never_lowers_severity() {
        let mut incident = open_incident(Severity::Info);
        incident
            .record_alert(&alert("x", Severity::Critical), ts("2025-01-15T10:01:00Z"))
            .unwrap();
        assert_eq!(incident.severity(), Severity::Critical);
        incident
            .record_alert(&alert("x", Severity::Warning), ts("2025-01-15T10:02:00Z"))
            .unwrap();
        assert_eq!(incident.severity(), Severity::Critical);
        assert_eq!(incident.alert_count(), 3);
        assert_eq!(incident.updated_at(), ts("2025-01-15T10:02:00Z"));
        assert_eq!(incident.impact(), "3 alerts from api");
    }

    #[test]
    fn escalate_raises_without_status_change() {
        let mut incident = open_incident(Severity::Warning);
        incident.investigate(ts("2025-01-15T10:05:00Z")).unwrap();
        let events = incident
            .escalate(Severity::Critical, ts("2025-01-15T10:30:00Z"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(incident.severity(), Severity::Critical);
        assert_eq!(incident.status(), IncidentStatus::Investigating);
        assert_eq!(incident.escalated_at(), Some(ts("2025-01-15T10:30:00Z")));
    }

    #[test]
    fn escalate_is_idempotent() {
        let mut incident = open_incident(Severity::Warning);
        incident
            .escalate(Severity::Critical, ts("2025-01-15T10:30:00Z"))
            .unwrap();
        let events = incident
            .escalate(Severity::Critical, ts("2025-01-15T10:31:00Z"))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(incident.updated_at(), ts("2025-01-15T10:30:00Z"));
    }

    #[test]
    fn resolve_sets_resolved_at_and_closes() {
        let mut incident = open_incident(Severity::Warning);
        incident.resolve(ts("2025-01-15T11:00:00Z")).unwrap();
        assert_eq!(incident.status(), IncidentStatus::Resolved);
        assert_eq!(incident.resolved_at(), Some(ts("2025-01-15T11:00:00Z")));
        assert!(!incident.is_open());
    }

    #[test]
    fn closed_incident_rejects_changes() {
        let mut incident = open_incident(Severity::Warning);
        incident.dismiss(ts("2025-01-15T11:00:00Z")).unwrap();
        let now = ts("2025-01-15T11:05:00Z");
        assert_eq!(
            incident.record_alert(&alert("x", Severity::Info), now),
            Err(DomainError::IncidentClosed)
        );
        assert_eq!(
            incident.escalate(Severity::Critical, now),
            Err(DomainError::IncidentClosed)
        );
        assert_eq!(incident.resolve(now), Err(DomainError::IncidentClosed));
        assert_eq!(incident.investigate(now), Err(DomainError::IncidentClosed));
    }

    #[test]
    fn single_alert_impact_is_singular() {
        assert_eq!(open_incident(Severity::Info).impact(), "1 alert from api");
    }
}
