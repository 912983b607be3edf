mod alert;
mod event;
mod incident;
mod rule;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use ember_ports::error::PortError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS rules (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        source TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_rules_enabled ON rules(enabled)",
    "CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        incident_id TEXT,
        severity TEXT NOT NULL,
        source TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_alerts_incident ON alerts(incident_id)",
    "CREATE TABLE IF NOT EXISTS incidents (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        severity TEXT NOT NULL,
        source TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status)",
    "CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        incident_id TEXT,
        data TEXT NOT NULL,
        occurred_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_incident ON events(incident_id)",
];

/// One pool behind every repository port. Entities are stored as JSON in a
/// `data` column next to the columns queries filter on.
#[derive(Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    pub async fn new(url: &str) -> Result<Self, PortError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| PortError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!(url, "sqlite store ready");
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), PortError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PortError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: &str) -> Result<T, PortError> {
    serde_json::from_str(data).map_err(|e| PortError::Persistence(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, PortError> {
    serde_json::to_string(value).map_err(|e| PortError::Persistence(e.to_string()))
}
