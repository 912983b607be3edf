use async_trait::async_trait;

use ember_core::events::DomainEvent;
use ember_ports::error::NotifyError;
use ember_ports::outbound::EventPublisher;

use super::SqliteDb;

/// Appends every published event to the `events` table as an audit log.
#[async_trait]
impl EventPublisher for SqliteDb {
    async fn publish(&self, events: Vec<DomainEvent>) -> Result<(), NotifyError> {
        for event in &events {
            let data = serde_json::to_string(event)
                .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

            sqlx::query(
                "INSERT INTO events (event_type, incident_id, data, occurred_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(event.event_type())
            .bind(event.incident_id().map(ToString::to_string))
            .bind(&data)
            .bind(event.occurred_at().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::test_support::{db, ts};
    use ember_core::events::{AlertReceived, IncidentResolved};
    use ember_core::ids::{AlertId, IncidentId};
    use ember_core::severity::Severity;

    #[tokio::test]
    async fn publish_stores_events() {
        let db = db().await;
        let incident_id = IncidentId::new();

        let events = vec![
            DomainEvent::AlertReceived(AlertReceived {
                alert_id: AlertId::new(),
                source: "api".into(),
                severity: Severity::Critical,
                occurred_at: ts("2025-01-15T10:00:00Z"),
            }),
            DomainEvent::IncidentResolved(IncidentResolved {
                incident_id: incident_id.clone(),
                occurred_at: ts("2025-01-15T10:01:00Z"),
            }),
        ];

        db.publish(events).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 2);

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT event_type FROM events WHERE incident_id = ?")
                .bind(incident_id.to_string())
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(rows, vec![("incident.resolved".to_string(),)]);
    }

    #[tokio::test]
    async fn publishing_nothing_is_fine() {
        let db = db().await;
        db.publish(vec![]).await.unwrap();
    }
}
