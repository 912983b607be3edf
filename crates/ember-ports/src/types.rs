use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ember_core::alert::RawAlert;
use ember_core::error::DomainError;
use ember_core::ids::IncidentId;
use ember_core::incident::{Incident, IncidentStatus};
use ember_core::rule::AlertRule;
use ember_core::severity::Severity;

/// Alert data from an external producer, before domain validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInput {
    pub source: String,
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Producer timestamp; ingestion time is used when absent.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_severity() -> String {
    "warning".to_string()
}

impl AlertInput {
    pub fn into_alert(self, now: DateTime<Utc>) -> Result<RawAlert, DomainError> {
        let severity: Severity = self.severity.parse()?;
        RawAlert::new(
            self.source,
            self.message,
            severity,
            self.labels,
            self.created_at.unwrap_or(now),
        )
    }
}

/// What ingesting one alert did to its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Held in its group; the group is still below the incident threshold.
    Buffered { group_size: usize },
    Opened(IncidentId),
    Updated(IncidentId),
}

impl IngestOutcome {
    pub fn incident_id(&self) -> Option<&IncidentId> {
        match self {
            Self::Buffered { .. } => None,
            Self::Opened(id) | Self::Updated(id) => Some(id),
        }
    }
}

/// Filter criteria for querying incidents.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub open_only: bool,
    pub limit: Option<u32>,
}

impl IncidentFilter {
    pub fn open() -> Self {
        Self {
            open_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.is_none_or_eq(incident.status())
            && self.severity.is_none_or_eq(incident.severity())
            && self
                .source
                .as_deref()
                .is_none_or_eq(incident.source())
            && (!self.open_only || incident.is_open())
    }
}

/// Filter criteria for listing rules.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub enabled: Option<bool>,
    pub source: Option<String>,
}

impl RuleFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            source: None,
        }
    }

    pub fn matches(&self, rule: &AlertRule) -> bool {
        self.enabled.is_none_or_eq(rule.enabled())
            && self.source.as_deref().is_none_or_eq(rule.source())
    }
}

trait OptionalMatch<T> {
    fn is_none_or_eq(&self, actual: T) -> bool;
}

impl<T: PartialEq> OptionalMatch<T> for Option<T> {
    fn is_none_or_eq(&self, actual: T) -> bool {
        match self {
            Some(expected) => *expected == actual,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn alert_input_defaults_and_converts() {
        let input: AlertInput =
            serde_json::from_value(json!({"source": "api", "message": "5xx spike"})).unwrap();
        let alert = input.into_alert(now()).unwrap();
        assert_eq!(alert.severity(), Severity::Warning);
        assert_eq!(alert.created_at(), now());
    }

    #[test]
    fn alert_input_rejects_unknown_severity() {
        let input = AlertInput {
            source: "api".into(),
            message: "x".into(),
            severity: "meh".into(),
            labels: BTreeMap::new(),
            created_at: None,
        };
        assert_eq!(
            input.into_alert(now()),
            Err(DomainError::UnknownSeverity("meh".into()))
        );
    }

    #[test]
    fn rule_filter_by_enabled() {
        let mut draft = ember_core::rule::RuleDraft::new("r");
        draft.enabled = false;
        let rule = AlertRule::create(draft, now()).unwrap();
        assert!(!RuleFilter::enabled().matches(&rule));
        assert!(RuleFilter::default().matches(&rule));
    }
}
