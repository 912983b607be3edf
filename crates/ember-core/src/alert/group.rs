use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupingKey, RawAlert};
use crate::ids::{GroupId, IncidentId};
use crate::severity::Severity;

/// Alerts sharing a grouping key inside one batching window.
///
/// The window is fixed at open time: it runs for `window` from the first
/// alert and does not slide when more alerts arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGroup {
    id: GroupId,
    key: GroupingKey,
    window_secs: i64,
    opened_at: DateTime<Utc>,
    alerts: Vec<RawAlert>,
    incident_id: Option<IncidentId>,
}

impl AlertGroup {
    pub fn open(key: GroupingKey, first: RawAlert, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: GroupId::new(),
            key,
            window_secs: window.num_seconds(),
            opened_at: now,
            alerts: vec![first],
            incident_id: None,
        }
    }

    /// Appends an alert, binding it to the group's incident if there is one.
    pub fn push(&mut self, mut alert: RawAlert) {
        if let Some(id) = &self.incident_id {
            alert.bind_incident(id.clone());
        }
        self.alerts.push(alert);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.closes_at()
    }

    pub fn closes_at(&self) -> DateTime<Utc> {
        self.opened_at + Duration::seconds(self.window_secs)
    }

    /// Binds the group, and every alert already in it, to an incident.
    pub fn bind_incident(&mut self, incident_id: IncidentId) {
        for alert in &mut self.alerts {
            alert.bind_incident(incident_id.clone());
        }
        self.incident_id = Some(incident_id);
    }

    /// Drops the incident binding so the next alert can open a new one.
    pub fn unbind_incident(&mut self) {
        self.incident_id = None;
    }

    /// Most frequent message in the group; the earliest wins ties.
    pub fn dominant_message(&self) -> &str {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for alert in &self.alerts {
            *counts.entry(alert.message()).or_default() += 1;
        }
        let mut best: Option<(&str, usize)> = None;
        for alert in &self.alerts {
            let count = counts[alert.message()];
            match best {
                Some((_, c)) if c >= count => {}
                _ => best = Some((alert.message(), count)),
            }
        }
        best.map(|(m, _)| m).unwrap_or_default()
    }

    pub fn highest_severity(&self) -> Severity {
        self.alerts
            .iter()
            .map(RawAlert::severity)
            .max()
            .unwrap_or_default()
    }

    pub fn source(&self) -> &str {
        self.alerts.first().map(RawAlert::source).unwrap_or_default()
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn key(&self) -> &GroupingKey {
        &self.key
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn alerts(&self) -> &[RawAlert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn incident_id(&self) -> Option<&IncidentId> {
        self.incident_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::GroupingPolicy;
    use std::collections::BTreeMap;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn alert(message: &str, severity: Severity) -> RawAlert {
        RawAlert::new("api", message, severity, BTreeMap::new(), ts("2025-01-15T10:00:00Z"))
            .unwrap()
    }

    fn group(first: RawAlert) -> AlertGroup {
        let key = GroupingKey::for_alert(&first, &GroupingPolicy::default());
        AlertGroup::open(key, first, Duration::seconds(300), ts("2025-01-15T10:00:00Z"))
    }

    #[test]
    fn window_is_fixed_from_first_alert() {
        let mut g = group(alert("a", Severity::Info));
        g.push(alert("b", Severity::Info));
        assert!(!g.is_expired(ts("2025-01-15T10:04:59Z")));
        assert!(g.is_expired(ts("2025-01-15T10:05:00Z")));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn dominant_message_is_most_frequent() {
        let mut g = group(alert("disk full", Severity::Info));
        g.push(alert("cpu high", Severity::Info));
        g.push(alert("cpu high", Severity::Info));
        assert_eq!(g.dominant_message(), "cpu high");
    }

    #[test]
    fn dominant_message_tie_keeps_earliest() {
        let mut g = group(alert("first", Severity::Info));
        g.push(alert("second", Severity::Info));
        assert_eq!(g.dominant_message(), "first");
    }

    #[test]
    fn highest_severity_across_members() {
        let mut g = group(alert("a", Severity::Info));
        g.push(alert("a", Severity::Critical));
        g.push(alert("a", Severity::Warning));
        assert_eq!(g.highest_severity(), Severity::Critical);
    }

    #[test]
    fn binding_round_trip() {
        let mut g = group(alert("a", Severity::Info));
        let id = IncidentId::new();
        g.bind_incident(id.clone());
        assert_eq!(g.incident_id(), Some(&id));
        assert_eq!(g.alerts()[0].incident_id(), Some(&id));
        g.push(alert("late", Severity::Info));
        assert_eq!(g.alerts()[1].incident_id(), Some(&id));
        g.unbind_incident();
        assert!(g.incident_id().is_none());
    }
}
