use async_trait::async_trait;

use ember_core::alert::RawAlert;
use ember_core::incident::Incident;
use ember_core::rule::{AlertRule, RuleDraft};
use ember_core::signal::Event;

use crate::error::UseCaseError;
use crate::types::{IncidentFilter, IngestOutcome, RuleFilter};

#[async_trait]
pub trait AlertIngestor: Send + Sync {
    async fn ingest_alert(&self, alert: RawAlert) -> Result<IngestOutcome, UseCaseError>;
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Runs an event through the rules and ingests every alert it raises.
    async fn handle_event(&self, event: Event) -> Result<Vec<IngestOutcome>, UseCaseError>;
}

#[async_trait]
pub trait RuleAuthoring: Send + Sync {
    async fn create_rule(&self, draft: RuleDraft) -> Result<AlertRule, UseCaseError>;
    async fn update_rule(&self, id: &str, draft: RuleDraft) -> Result<AlertRule, UseCaseError>;
    async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<AlertRule, UseCaseError>;
    async fn delete_rule(&self, id: &str) -> Result<(), UseCaseError>;
    async fn list_rules(&self, filter: RuleFilter) -> Result<Vec<AlertRule>, UseCaseError>;
}

#[async_trait]
pub trait IncidentCommands: Send + Sync {
    async fn investigate(&self, id: &str) -> Result<Incident, UseCaseError>;
    async fn resolve(&self, id: &str) -> Result<Incident, UseCaseError>;
    async fn dismiss(&self, id: &str) -> Result<Incident, UseCaseError>;
    async fn get_incident(&self, id: &str) -> Result<Incident, UseCaseError>;
    async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>, UseCaseError>;
}
