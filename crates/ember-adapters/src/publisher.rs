use async_trait::async_trait;

use ember_core::events::DomainEvent;
use ember_ports::error::NotifyError;
use ember_ports::outbound::EventPublisher;

/// Logs every domain event, then hands the batch to `inner`.
#[derive(Clone)]
pub struct TracingPublisher<P> {
    inner: P,
}

impl<P: EventPublisher> TracingPublisher<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::AlertReceived(e) => {
            tracing::debug!(alert_id = %e.alert_id, source = %e.source, severity = %e.severity, "alert received");
        }
        DomainEvent::RuleTriggered(e) => {
            tracing::info!(rule_id = %e.rule_id, rule = %e.rule_name, source = %e.event_source, "rule triggered");
        }
        DomainEvent::IncidentOpened(e) => {
            tracing::info!(incident_id = %e.incident_id, severity = %e.severity, alerts = e.alert_count, title = %e.title, "incident opened");
        }
        DomainEvent::IncidentUpdated(e) => {
            tracing::debug!(incident_id = %e.incident_id, alerts = e.alert_count, severity = %e.severity, "incident updated");
        }
        DomainEvent::IncidentEscalated(e) => {
            tracing::warn!(incident_id = %e.incident_id, from = %e.from, to = %e.to, "incident escalated");
        }
        other => {
            if let Some(incident_id) = other.incident_id() {
                tracing::info!(incident_id = %incident_id, event = other.event_type(), "incident status changed");
            }
        }
    }
}

#[async_trait]
impl<P: EventPublisher> EventPublisher for TracingPublisher<P> {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError> {
        events.iter().for_each(log_event);
        let count = events.len();
        self.inner.publish(events).await.map_err(|e| {
            tracing::warn!(events = count, error = %e, "downstream publish failed");
            e
        })
    }
}
