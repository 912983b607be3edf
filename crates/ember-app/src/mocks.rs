//! Hand-written port mocks shared by the service tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::alert::RawAlert;
use ember_core::events::DomainEvent;
use ember_core::incident::Incident;
use ember_core::rule::AlertRule;
use ember_ports::error::{NotifyError, PortError};
use ember_ports::outbound::{AlertRepository, EventPublisher, IncidentRepository, RuleRepository};
use ember_ports::types::{IncidentFilter, RuleFilter};

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Takes one injected failure, if any are left.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct MockRuleRepo {
    pub rules: Mutex<Vec<AlertRule>>,
    pub triggers: Mutex<Vec<(String, DateTime<Utc>)>>,
    pub fail_lists: AtomicU32,
}

impl MockRuleRepo {
    pub fn with(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RuleRepository for MockRuleRepo {
    async fn save(&self, rule: &AlertRule) -> Result<(), PortError> {
        let mut rules = self.rules.lock().unwrap();
        if let Some(pos) = rules.iter().position(|r| r.id() == rule.id()) {
            rules[pos] = rule.clone();
        } else {
            rules.push(rule.clone());
        }
        Ok(())
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<AlertRule>, PortError> {
        let rules = self.rules.lock().unwrap();
        Ok(rules.iter().find(|r| r.id().to_string() == id).cloned())
    }
    async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, PortError> {
        if take_failure(&self.fail_lists) {
            return Err(PortError::Connection("rules unavailable".into()));
        }
        let rules = self.rules.lock().unwrap();
        Ok(rules.iter().filter(|r| filter.matches(r)).cloned().collect())
    }
    async fn delete(&self, id: &str) -> Result<bool, PortError> {
        let mut rules = self.rules.lock().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id().to_string() != id);
        Ok(rules.len() != before)
    }
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        self.triggers.lock().unwrap().push((id.to_string(), at));
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.id().to_string() == id) {
            rule.record_trigger(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAlertRepo {
    pub alerts: Mutex<Vec<RawAlert>>,
    pub fail_saves: AtomicU32,
}

#[async_trait]
impl AlertRepository for MockAlertRepo {
    async fn save(&self, alert: &RawAlert) -> Result<(), PortError> {
        if take_failure(&self.fail_saves) {
            return Err(PortError::Connection("alerts unavailable".into()));
        }
        let mut alerts = self.alerts.lock().unwrap();
        if let Some(pos) = alerts.iter().position(|a| a.id() == alert.id()) {
            alerts[pos] = alert.clone();
        } else {
            alerts.push(alert.clone());
        }
        Ok(())
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<RawAlert>, PortError> {
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts.iter().find(|a| a.id().to_string() == id).cloned())
    }
    async fn find_by_incident(&self, incident_id: &str) -> Result<Vec<RawAlert>, PortError> {
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts
            .iter()
            .filter(|a| a.incident_id().is_some_and(|i| i.to_string() == incident_id))
            .cloned()
            .collect())
    }
}

/// Runs once against the stored rows, after a listing has been taken.
pub type AfterFilter = Box<dyn FnOnce(&mut [Incident]) + Send>;

#[derive(Default)]
pub struct MockIncidentRepo {
    pub incidents: Mutex<Vec<Incident>>,
    pub fail_saves: AtomicU32,
    /// Ids whose saves always fail.
    pub broken: Mutex<Vec<String>>,
    pub after_filter: Mutex<Option<AfterFilter>>,
}

impl MockIncidentRepo {
    pub fn all(&self) -> Vec<Incident> {
        self.incidents.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentRepository for MockIncidentRepo {
    async fn save(&self, incident: &Incident) -> Result<(), PortError> {
        if take_failure(&self.fail_saves) {
            return Err(PortError::Connection("incidents unavailable".into()));
        }
        if self
            .broken
            .lock()
            .unwrap()
            .contains(&incident.id().to_string())
        {
            return Err(PortError::Persistence("row is corrupt".into()));
        }
        let mut incidents = self.incidents.lock().unwrap();
        if let Some(pos) = incidents.iter().position(|i| i.id() == incident.id()) {
            incidents[pos] = incident.clone();
        } else {
            incidents.push(incident.clone());
        }
        Ok(())
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, PortError> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents.iter().find(|i| i.id().to_string() == id).cloned())
    }
    async fn find_by_filter(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, PortError> {
        let mut incidents = self.incidents.lock().unwrap();
        let listed = incidents
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        if let Some(hook) = self.after_filter.lock().unwrap().take() {
            hook(incidents.as_mut_slice());
        }
        Ok(listed)
    }
}

#[derive(Default)]
pub struct MockEventPublisher {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl MockEventPublisher {
    pub fn types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError> {
        self.events.lock().unwrap().extend(events);
        Ok(())
    }
}
