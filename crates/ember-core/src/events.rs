use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{AlertId, IncidentId, RuleId};
use crate::severity::Severity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DomainEvent {
    AlertReceived(AlertReceived),
    RuleTriggered(RuleTriggered),
    IncidentOpened(IncidentOpened),
    IncidentUpdated(IncidentUpdated),
    IncidentEscalated(IncidentEscalated),
    IncidentInvestigating(IncidentInvestigating),
    IncidentResolved(IncidentResolved),
    IncidentDismissed(IncidentDismissed),
}

impl DomainEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::AlertReceived(e) => e.occurred_at,
            Self::RuleTriggered(e) => e.occurred_at,
            Self::IncidentOpened(e) => e.occurred_at,
            Self::IncidentUpdated(e) => e.occurred_at,
            Self::IncidentEscalated(e) => e.occurred_at,
            Self::IncidentInvestigating(e) => e.occurred_at,
            Self::IncidentResolved(e) => e.occurred_at,
            Self::IncidentDismissed(e) => e.occurred_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AlertReceived(_) => "alert.received",
            Self::RuleTriggered(_) => "rule.triggered",
            Self::IncidentOpened(_) => "incident.opened",
            Self::IncidentUpdated(_) => "incident.updated",
            Self::IncidentEscalated(_) => "incident.escalated",
            Self::IncidentInvestigating(_) => "incident.investigating",
            Self::IncidentResolved(_) => "incident.resolved",
            Self::IncidentDismissed(_) => "incident.dismissed",
        }
    }

    /// Incident the event concerns, if any.
    pub fn incident_id(&self) -> Option<&IncidentId> {
        match self {
            Self::AlertReceived(_) | Self::RuleTriggered(_) => None,
            Self::IncidentOpened(e) => Some(&e.incident_id),
            Self::IncidentUpdated(e) => Some(&e.incident_id),
            Self::IncidentEscalated(e) => Some(&e.incident_id),
            Self::IncidentInvestigating(e) => Some(&e.incident_id),
            Self::IncidentResolved(e) => Some(&e.incident_id),
            Self::IncidentDismissed(e) => Some(&e.incident_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReceived {
    pub alert_id: AlertId,
    pub source: String,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleTriggered {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub event_source: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentOpened {
    pub incident_id: IncidentId,
    pub title: String,
    pub severity: Severity,
    pub alert_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentUpdated {
    pub incident_id: IncidentId,
    pub alert_id: AlertId,
    pub alert_count: u32,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentEscalated {
    pub incident_id: IncidentId,
    pub from: Severity,
    pub to: Severity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentInvestigating {
    pub incident_id: IncidentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentResolved {
    pub incident_id: IncidentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentDismissed {
    pub incident_id: IncidentId,
    pub occurred_at: DateTime<Utc>,
}
