use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::ids::RuleId;
use ember_core::rule::{AlertRule, RuleDraft};
use ember_ports::error::UseCaseError;
use ember_ports::inbound::RuleAuthoring;
use ember_ports::outbound::RuleRepository;
use ember_ports::types::RuleFilter;

use crate::clock::Clock;
use crate::error::AppError;
use crate::rule_engine::RuleEngine;

/// Rule authoring. Drafts are validated here, once, so the engine only
/// ever sees well-formed rules.
pub struct RuleService<R>
where
    R: RuleRepository,
{
    rules: R,
    engine: Arc<RuleEngine<R>>,
    clock: Arc<dyn Clock>,
}

impl<R> RuleService<R>
where
    R: RuleRepository,
{
    pub fn new(rules: R, engine: Arc<RuleEngine<R>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            engine,
            clock,
        }
    }

    pub async fn create(&self, draft: RuleDraft, now: DateTime<Utc>) -> Result<AlertRule, AppError> {
        let rule = AlertRule::create(draft, now)?;
        self.rules.save(&rule).await?;
        tracing::info!(rule_id = %rule.id(), rule = rule.name(), "rule created");
        Ok(rule)
    }

    pub async fn update(
        &self,
        id: &str,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<AlertRule, AppError> {
        let mut rule = self.load(id).await?;
        rule.update(draft, now)?;
        self.rules.save(&rule).await?;
        tracing::info!(rule_id = %rule.id(), "rule updated");
        Ok(rule)
    }

    pub async fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<AlertRule, AppError> {
        let mut rule = self.load(id).await?;
        rule.set_enabled(enabled, now);
        self.rules.save(&rule).await?;
        Ok(rule)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let rule_id = RuleId::parse(id)?;
        if !self.rules.delete(id).await? {
            return Err(AppError::NotFound(format!("rule {id}")));
        }
        self.engine.forget_rule(&rule_id);
        tracing::info!(rule_id = %rule_id, "rule deleted");
        Ok(())
    }

    pub async fn list(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>, AppError> {
        Ok(self.rules.list(filter).await?)
    }

    async fn load(&self, id: &str) -> Result<AlertRule, AppError> {
        RuleId::parse(id)?;
        self.rules
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rule {id}")))
    }
}

#[async_trait]
impl<R> RuleAuthoring for RuleService<R>
where
    R: RuleRepository,
{
    async fn create_rule(&self, draft: RuleDraft) -> Result<AlertRule, UseCaseError> {
        Ok(self.create(draft, self.clock.now()).await?)
    }

    async fn update_rule(&self, id: &str, draft: RuleDraft) -> Result<AlertRule, UseCaseError> {
        Ok(self.update(id, draft, self.clock.now()).await?)
    }

    async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<AlertRule, UseCaseError> {
        Ok(self.set_enabled(id, enabled, self.clock.now()).await?)
    }

    async fn delete_rule(&self, id: &str) -> Result<(), UseCaseError> {
        Ok(self.delete(id).await?)
    }

    async fn list_rules(&self, filter: RuleFilter) -> Result<Vec<AlertRule>, UseCaseError> {
        Ok(self.list(&filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mocks::{ts, MockRuleRepo};
    use chrono_tz::Tz;
    use ember_core::error::DomainError;
    use ember_core::rule::{ConditionDraft, ConditionValue};

    fn service() -> RuleService<Arc<MockRuleRepo>> {
        let repo = Arc::new(MockRuleRepo::default());
        let engine = Arc::new(RuleEngine::new(Arc::clone(&repo), Tz::UTC));
        RuleService::new(
            repo,
            engine,
            Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z"))),
        )
    }

    fn now() -> DateTime<Utc> {
        ts("2025-01-15T10:00:00Z")
    }

    #[tokio::test]
    async fn create_persists_valid_rule() {
        let svc = service();
        let rule = svc.create(RuleDraft::new("cpu"), now()).await.unwrap();
        let stored = svc.rules.find_by_id(&rule.id().to_string()).await.unwrap();
        assert_eq!(stored, Some(rule));
    }

    #[tokio::test]
    async fn create_rejects_unknown_operator() {
        let svc = service();
        let mut draft = RuleDraft::new("cpu");
        draft.conditions = vec![ConditionDraft {
            field: "usage".into(),
            operator: "approximately".into(),
            value: ConditionValue::Number(1.0),
        }];
        let result = svc.create(draft, now()).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::UnknownOperator(_)))
        ));
        assert!(svc.rules.rules.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_rule_is_not_found() {
        let svc = service();
        let id = RuleId::new().to_string();
        let result = svc.update(&id, RuleDraft::new("x"), now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_with_malformed_id_is_rejected() {
        let svc = service();
        let result = svc.update("nope", RuleDraft::new("x"), now()).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InvalidId(_)))
        ));
    }

    #[tokio::test]
    async fn disable_then_enable() {
        let svc = service();
        let rule = svc.create(RuleDraft::new("cpu"), now()).await.unwrap();
        let id = rule.id().to_string();

        let disabled = svc.set_enabled(&id, false, now()).await.unwrap();
        assert!(!disabled.enabled());
        assert!(svc.list(&RuleFilter::enabled()).await.unwrap().is_empty());

        svc.set_enabled(&id, true, now()).await.unwrap();
        assert_eq!(svc.list(&RuleFilter::enabled()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_rule() {
        let svc = service();
        let rule = svc.create(RuleDraft::new("cpu"), now()).await.unwrap();
        let id = rule.id().to_string();
        svc.delete(&id).await.unwrap();
        assert!(matches!(svc.delete(&id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn trait_errors_map_to_use_case_errors() {
        let svc = service();
        let authoring: &dyn RuleAuthoring = &svc;
        let result = authoring.delete_rule(&RuleId::new().to_string()).await;
        assert!(matches!(result, Err(UseCaseError::NotFound(_))));
    }
}
