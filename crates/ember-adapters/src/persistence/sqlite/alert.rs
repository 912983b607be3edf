use async_trait::async_trait;

use ember_core::alert::RawAlert;
use ember_ports::error::PortError;
use ember_ports::outbound::AlertRepository;

use super::{decode, encode, SqliteDb};

#[async_trait]
impl AlertRepository for SqliteDb {
    async fn save(&self, alert: &RawAlert) -> Result<(), PortError> {
        let data = encode(alert)?;

        sqlx::query(
            "INSERT INTO alerts (id, incident_id, severity, source, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                incident_id = excluded.incident_id,
                severity = excluded.severity,
                source = excluded.source,
                data = excluded.data",
        )
        .bind(alert.id().to_string())
        .bind(alert.incident_id().map(ToString::to_string))
        .bind(alert.severity().as_str())
        .bind(alert.source())
        .bind(&data)
        .bind(alert.created_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RawAlert>, PortError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        row.map(|(data,)| decode(&data)).transpose()
    }

    async fn find_by_incident(&self, incident_id: &str) -> Result<Vec<RawAlert>, PortError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM alerts WHERE incident_id = ? ORDER BY created_at ASC",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        rows.iter().map(|(data,)| decode(data)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::test_support::{db, ts};
    use ember_core::ids::IncidentId;
    use ember_core::severity::Severity;
    use std::collections::BTreeMap;

    fn alert(message: &str, at: &str) -> RawAlert {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "prod".to_string());
        RawAlert::new("api", message, Severity::Warning, labels, ts(at)).unwrap()
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let db = db().await;
        let a = alert("5xx", "2025-01-15T10:00:00Z");
        db.save(&a).await.unwrap();

        let found = AlertRepository::find_by_id(&db, &a.id().to_string())
            .await
            .unwrap();
        assert_eq!(found, Some(a));
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let db = db().await;
        let found = AlertRepository::find_by_id(&db, "nope").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn binding_an_incident_is_queryable() {
        let db = db().await;
        let incident = IncidentId::new();
        let mut first = alert("5xx", "2025-01-15T10:00:00Z");
        let mut second = alert("5xx again", "2025-01-15T10:01:00Z");
        let loose = alert("unrelated", "2025-01-15T10:02:00Z");
        db.save(&first).await.unwrap();

        first.bind_incident(incident.clone());
        second.bind_incident(incident.clone());
        db.save(&second).await.unwrap();
        db.save(&first).await.unwrap();
        db.save(&loose).await.unwrap();

        let bound = db.find_by_incident(&incident.to_string()).await.unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].message(), "5xx");
        assert_eq!(bound[1].message(), "5xx again");
    }
}
