use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::error::DomainError;
use ember_core::events::DomainEvent;
use ember_core::ids::IncidentId;
use ember_core::incident::Incident;
use ember_ports::error::UseCaseError;
use ember_ports::inbound::IncidentCommands;
use ember_ports::outbound::{EventPublisher, IncidentRepository};
use ember_ports::types::IncidentFilter;

use crate::clock::Clock;
use crate::error::AppError;
use crate::incident_store::IncidentStore;

/// Explicit operator transitions. Resolution and dismissal only ever
/// happen through here, each under the incident's lock.
pub struct IncidentService<I, EP>
where
    I: IncidentRepository,
    EP: EventPublisher,
{
    incidents: Arc<IncidentStore<I>>,
    events: EP,
    clock: Arc<dyn Clock>,
}

impl<I, EP> IncidentService<I, EP>
where
    I: IncidentRepository,
    EP: EventPublisher,
{
    pub fn new(incidents: Arc<IncidentStore<I>>, events: EP, clock: Arc<dyn Clock>) -> Self {
        Self {
            incidents,
            events,
            clock,
        }
    }

    pub async fn investigate(&self, id: &str, now: DateTime<Utc>) -> Result<Incident, AppError> {
        self.transition(id, |incident| incident.investigate(now))
            .await
    }

    pub async fn resolve(&self, id: &str, now: DateTime<Utc>) -> Result<Incident, AppError> {
        self.transition(id, |incident| incident.resolve(now)).await
    }

    pub async fn dismiss(&self, id: &str, now: DateTime<Utc>) -> Result<Incident, AppError> {
        self.transition(id, |incident| incident.dismiss(now)).await
    }

    pub async fn get(&self, id: &str) -> Result<Incident, AppError> {
        self.load(&IncidentId::parse(id)?).await
    }

    pub async fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError> {
        Ok(self.incidents.repo().find_by_filter(filter).await?)
    }

    async fn load(&self, id: &IncidentId) -> Result<Incident, AppError> {
        self.incidents
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("incident {id}")))
    }

    async fn transition<F>(&self, id: &str, apply: F) -> Result<Incident, AppError>
    where
        F: FnOnce(&mut Incident) -> Result<Vec<DomainEvent>, DomainError> + Send,
    {
        let id = IncidentId::parse(id)?;
        let _held = self.incidents.acquire(&id).await;
        let mut incident = self.load(&id).await?;
        let events = apply(&mut incident)?;
        if events.is_empty() {
            return Ok(incident);
        }
        self.incidents.save(&incident).await?;
        tracing::info!(incident_id = %incident.id(), status = %incident.status(), "incident status changed");
        if let Err(e) = self.events.publish(events).await {
            tracing::warn!(incident_id = %incident.id(), error = %e, "failed to publish status change");
        }
        Ok(incident)
    }
}

#[async_trait]
impl<I, EP> IncidentCommands for IncidentService<I, EP>
where
    I: IncidentRepository,
    EP: EventPublisher,
{
    async fn investigate(&self, id: &str) -> Result<Incident, UseCaseError> {
        Ok(IncidentService::investigate(self, id, self.clock.now()).await?)
    }

    async fn resolve(&self, id: &str) -> Result<Incident, UseCaseError> {
        Ok(IncidentService::resolve(self, id, self.clock.now()).await?)
    }

    async fn dismiss(&self, id: &str) -> Result<Incident, UseCaseError> {
        Ok(IncidentService::dismiss(self, id, self.clock.now()).await?)
    }

    async fn get_incident(&self, id: &str) -> Result<Incident, UseCaseError> {
        Ok(self.get(id).await?)
    }

    async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>, UseCaseError> {
        Ok(self.list(&filter).await?)
    }
}
