use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::alert::RawAlert;
use ember_core::events::DomainEvent;
use ember_core::incident::Incident;
use ember_core::rule::AlertRule;

use crate::error::{NotifyError, PortError};
use crate::types::{IncidentFilter, RuleFilter};

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn save(&self, rule: &AlertRule) -> Result<(), PortError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<AlertRule>, PortError>;
    async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, PortError>;
    /// Returns whether a rule was removed.
    async fn delete(&self, id: &str) -> Result<bool, PortError>;
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), PortError>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn save(&self, alert: &RawAlert) -> Result<(), PortError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<RawAlert>, PortError>;
    async fn find_by_incident(&self, incident_id: &str) -> Result<Vec<RawAlert>, PortError>;
}

#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn save(&self, incident: &Incident) -> Result<(), PortError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, PortError>;
    async fn find_by_filter(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, PortError>;
}

/// Informs downstream collaborators (notifications, audit) of domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: RuleRepository + ?Sized> RuleRepository for Arc<T> {
    async fn save(&self, rule: &AlertRule) -> Result<(), PortError> {
        (**self).save(rule).await
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<AlertRule>, PortError> {
        (**self).find_by_id(id).await
    }
    async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, PortError> {
        (**self).list(filter).await
    }
    async fn delete(&self, id: &str) -> Result<bool, PortError> {
        (**self).delete(id).await
    }
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        (**self).record_trigger(id, at).await
    }
}

#[async_trait]
impl<T: AlertRepository + ?Sized> AlertRepository for Arc<T> {
    async fn save(&self, alert: &RawAlert) -> Result<(), PortError> {
        (**self).save(alert).await
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<RawAlert>, PortError> {
        (**self).find_by_id(id).await
    }
    async fn find_by_incident(&self, incident_id: &str) -> Result<Vec<RawAlert>, PortError> {
        (**self).find_by_incident(incident_id).await
    }
}

#[async_trait]
impl<T: IncidentRepository + ?Sized> IncidentRepository for Arc<T> {
    async fn save(&self, incident: &Incident) -> Result<(), PortError> {
        (**self).save(incident).await
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, PortError> {
        (**self).find_by_id(id).await
    }
    async fn find_by_filter(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, PortError> {
        (**self).find_by_filter(filter).await
    }
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError> {
        (**self).publish(events).await
    }
}
