use async_trait::async_trait;

use ember_core::incident::Incident;
use ember_ports::error::PortError;
use ember_ports::outbound::IncidentRepository;
use ember_ports::types::IncidentFilter;

use super::{decode, encode, SqliteDb};

#[async_trait]
impl IncidentRepository for SqliteDb {
    async fn save(&self, incident: &Incident) -> Result<(), PortError> {
        let data = encode(incident)?;

        sqlx::query(
            "INSERT INTO incidents (id, status, severity, source, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                severity = excluded.severity,
                source = excluded.source,
                data = excluded.data,
                updated_at = excluded.updated_at",
        )
        .bind(incident.id().to_string())
        .bind(incident.status().as_str())
        .bind(incident.severity().as_str())
        .bind(incident.source())
        .bind(&data)
        .bind(incident.created_at().to_rfc3339())
        .bind(incident.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, PortError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        row.map(|(data,)| decode(&data)).transpose()
    }

    async fn find_by_filter(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, PortError> {
        let mut sql = String::from("SELECT data FROM incidents WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            binds.push(severity.as_str().to_string());
        }
        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            binds.push(source.clone());
        }
        if filter.open_only {
            sql.push_str(" AND status IN ('active', 'investigating')");
        }

        sql.push_str(" ORDER BY created_at ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for b in &binds {
            query = query.bind(b);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        rows.iter().map(|(data,)| decode(data)).collect()
    }
}
