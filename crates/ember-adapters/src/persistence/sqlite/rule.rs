use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::rule::AlertRule;
use ember_ports::error::PortError;
use ember_ports::outbound::RuleRepository;
use ember_ports::types::RuleFilter;

use super::{decode, encode, SqliteDb};

#[async_trait]
impl RuleRepository for SqliteDb {
    async fn save(&self, rule: &AlertRule) -> Result<(), PortError> {
        let data = encode(rule)?;

        sqlx::query(
            "INSERT INTO rules (id, name, enabled, source, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                enabled = excluded.enabled,
                source = excluded.source,
                data = excluded.data",
        )
        .bind(rule.id().to_string())
        .bind(rule.name())
        .bind(rule.enabled())
        .bind(rule.source())
        .bind(&data)
        .bind(rule.created_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AlertRule>, PortError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        row.map(|(data,)| decode(&data)).transpose()
    }

    async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, PortError> {
        let mut sql = String::from("SELECT data FROM rules WHERE 1=1");
        if filter.enabled.is_some() {
            sql.push_str(" AND enabled = ?");
        }
        if filter.source.is_some() {
            sql.push_str(" AND source = ?");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        if let Some(enabled) = filter.enabled {
            query = query.bind(enabled);
        }
        if let Some(source) = &filter.source {
            query = query.bind(source);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        rows.iter().map(|(data,)| decode(data)).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, PortError> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        let Some(mut rule) = RuleRepository::find_by_id(self, id).await? else {
            return Err(PortError::NotFound);
        };
        rule.record_trigger(at);
        RuleRepository::save(self, &rule).await
    }
}
