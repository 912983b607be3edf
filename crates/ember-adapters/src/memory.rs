use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::alert::RawAlert;
use ember_core::events::DomainEvent;
use ember_core::incident::Incident;
use ember_core::rule::AlertRule;
use ember_ports::error::{NotifyError, PortError};
use ember_ports::outbound::{AlertRepository, EventPublisher, IncidentRepository, RuleRepository};
use ember_ports::types::{IncidentFilter, RuleFilter};

#[derive(Default)]
struct Tables {
    rules: HashMap<String, AlertRule>,
    alerts: HashMap<String, RawAlert>,
    incidents: HashMap<String, Incident>,
    events: Vec<DomainEvent>,
}

/// Process-local store implementing every outbound port. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far, oldest first.
    pub fn events(&self) -> Result<Vec<DomainEvent>, PortError> {
        Ok(self.read()?.events.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, PortError> {
        self.tables
            .read()
            .map_err(|e| PortError::Persistence(format!("lock error: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, PortError> {
        self.tables
            .write()
            .map_err(|e| PortError::Persistence(format!("lock error: {e}")))
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn save(&self, rule: &AlertRule) -> Result<(), PortError> {
        self.write()?
            .rules
            .insert(rule.id().to_string(), rule.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AlertRule>, PortError> {
        Ok(self.read()?.rules.get(id).cloned())
    }

    async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, PortError> {
        let mut rules: Vec<AlertRule> = self
            .read()?
            .rules
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.created_at());
        Ok(rules)
    }

    async fn delete(&self, id: &str) -> Result<bool, PortError> {
        Ok(self.write()?.rules.remove(id).is_some())
    }

    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        let mut tables = self.write()?;
        let rule = tables.rules.get_mut(id).ok_or(PortError::NotFound)?;
        rule.record_trigger(at);
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for MemoryStore {
    async fn save(&self, alert: &RawAlert) -> Result<(), PortError> {
        self.write()?
            .alerts
            .insert(alert.id().to_string(), alert.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RawAlert>, PortError> {
        Ok(self.read()?.alerts.get(id).cloned())
    }

    async fn find_by_incident(&self, incident_id: &str) -> Result<Vec<RawAlert>, PortError> {
        let mut alerts: Vec<RawAlert> = self
            .read()?
            .alerts
            .values()
            .filter(|a| {
                a.incident_id()
                    .is_some_and(|id| id.to_string() == incident_id)
            })
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at());
        Ok(alerts)
    }
}

#[async_trait]
impl IncidentRepository for MemoryStore {
    async fn save(&self, incident: &Incident) -> Result<(), PortError> {
        self.write()?
            .incidents
            .insert(incident.id().to_string(), incident.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, PortError> {
        Ok(self.read()?.incidents.get(id).cloned())
    }

    async fn find_by_filter(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, PortError> {
        let mut incidents: Vec<Incident> = self
            .read()?
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        incidents.sort_by_key(|i| i.created_at());
        if let Some(limit) = filter.limit {
            incidents.truncate(limit as usize);
        }
        Ok(incidents)
    }
}

#[async_trait]
impl EventPublisher for MemoryStore {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError> {
        let mut tables = self
            .write()
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;
        tables.events.extend(events);
        Ok(())
    }
}
