pub mod group;
pub mod grouping;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{AlertId, IncidentId, RuleId};
use crate::rule::{build_alert_message, AlertRule};
use crate::severity::Severity;
use crate::signal::Event;

pub use group::AlertGroup;
pub use grouping::{GroupingKey, GroupingPolicy};

/// Label carrying the id of the rule that synthesized an alert.
pub const RULE_ID_LABEL: &str = "ruleId";
pub const RULE_NAME_LABEL: &str = "ruleName";

/// A single alert, emitted by a producer or synthesized from a rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAlert {
    id: AlertId,
    source: String,
    message: String,
    severity: Severity,
    labels: BTreeMap<String, String>,
    incident_id: Option<IncidentId>,
    created_at: DateTime<Utc>,
}

impl RawAlert {
    pub fn new(
        source: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        labels: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let alert = Self {
            id: AlertId::new(),
            source: source.into(),
            message: message.into(),
            severity,
            labels,
            incident_id: None,
            created_at: now,
        };
        alert.validate()?;
        Ok(alert)
    }

    /// Builds the alert a matched rule raises for `event`.
    pub fn from_rule(rule: &AlertRule, event: &Event, now: DateTime<Utc>) -> Self {
        let mut labels = rule.labels().clone();
        labels.insert(RULE_ID_LABEL.into(), rule.id().to_string());
        labels.insert(RULE_NAME_LABEL.into(), rule.name().to_string());
        Self {
            id: AlertId::new(),
            source: event.source().to_string(),
            message: build_alert_message(rule, event),
            severity: rule.severity(),
            labels,
            incident_id: None,
            created_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.source.trim().is_empty() {
            return Err(DomainError::InvalidAlert("source is empty".into()));
        }
        if self.message.trim().is_empty() {
            return Err(DomainError::InvalidAlert("message is empty".into()));
        }
        Ok(())
    }

    pub fn bind_incident(&mut self, incident_id: IncidentId) {
        self.incident_id = Some(incident_id);
    }

    /// Origin rule, when the alert carries a parseable `ruleId` label.
    pub fn rule_id(&self) -> Option<RuleId> {
        self.labels
            .get(RULE_ID_LABEL)
            .and_then(|id| RuleId::parse(id).ok())
    }

    pub fn id(&self) -> &AlertId {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn incident_id(&self) -> Option<&IncidentId> {
        self.incident_id.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDraft;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn blank_source_rejected() {
        let result = RawAlert::new(" ", "disk full", Severity::Warning, BTreeMap::new(), now());
        assert!(matches!(result, Err(DomainError::InvalidAlert(_))));
    }

    #[test]
    fn from_rule_merges_rule_labels() {
        let mut draft = RuleDraft::new("Disk");
        draft.severity = "critical".into();
        draft.labels = BTreeMap::from([
            ("team".into(), "storage".into()),
            (RULE_NAME_LABEL.into(), "overridden".into()),
        ]);
        draft.message_template = Some("{{mount}} is full".into());
        let rule = AlertRule::create(draft, now()).unwrap();
        let event = Event::new("node-7", "disk.sample", json!({"mount": "/var"}), now()).unwrap();

        let alert = RawAlert::from_rule(&rule, &event, now());

        assert_eq!(alert.source(), "node-7");
        assert_eq!(alert.message(), "/var is full");
        assert_eq!(alert.severity(), Severity::Critical);
        assert_eq!(alert.labels()["team"], "storage");
        assert_eq!(alert.labels()[RULE_NAME_LABEL], "Disk");
        assert_eq!(alert.rule_id().as_ref(), Some(rule.id()));
        assert!(alert.incident_id().is_none());
    }

    #[test]
    fn rule_id_ignores_garbage_label() {
        let labels = BTreeMap::from([(RULE_ID_LABEL.into(), "nope".into())]);
        let alert = RawAlert::new("api", "down", Severity::Info, labels, now()).unwrap();
        assert_eq!(alert.rule_id(), None);
    }
}
