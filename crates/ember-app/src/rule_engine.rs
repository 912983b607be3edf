use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use ember_core::error::DomainError;
use ember_core::ids::RuleId;
use ember_core::rule::{AlertRule, TriggerHistory};
use ember_core::signal::Event;
use ember_ports::outbound::RuleRepository;
use ember_ports::types::RuleFilter;

use crate::error::AppError;

type HistorySlot = Arc<tokio::sync::Mutex<TriggerHistory>>;

/// Matches events against the stored rules and applies per-rule throttling.
///
/// Throttle state lives here, one async mutex per rule, so two events for
/// the same rule are gated one after the other while other rules proceed.
pub struct RuleEngine<R>
where
    R: RuleRepository,
{
    rules: R,
    default_tz: Tz,
    history: Mutex<HashMap<RuleId, HistorySlot>>,
}

impl<R> RuleEngine<R>
where
    R: RuleRepository,
{
    pub fn new(rules: R, default_tz: Tz) -> Self {
        Self {
            rules,
            default_tz,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Rules triggered by `event`, in repository order, with their trigger
    /// already recorded. A rule that fails to evaluate counts as no match.
    pub async fn evaluate_event(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertRule>, AppError> {
        let rules = self.rules.list(&RuleFilter::enabled()).await?;
        let mut matched = Vec::new();

        for mut rule in rules {
            match self.evaluate_rule(&mut rule, event, now).await {
                Ok(true) => matched.push(rule),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule.id(),
                        rule = rule.name(),
                        error = %e,
                        "rule evaluation failed, treating as no match"
                    );
                }
            }
        }

        tracing::debug!(
            source = event.source(),
            event_type = event.event_type(),
            matched = matched.len(),
            "event evaluated"
        );
        Ok(matched)
    }

    async fn evaluate_rule(
        &self,
        rule: &mut AlertRule,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if !rule.enabled() || !rule.targets(event) {
            return Ok(false);
        }
        rule.validate()?;
        if !rule.window_admits(event.timestamp(), self.default_tz)? {
            return Ok(false);
        }
        if !rule.conditions_hold(event) {
            return Ok(false);
        }

        let slot = self.slot(rule);
        let mut history = slot.lock().await;
        history.observe_persisted(rule.last_triggered_at());

        if history.in_cooldown(rule.cooldown_seconds(), now) {
            tracing::debug!(rule_id = %rule.id(), "suppressed by cooldown");
            return Ok(false);
        }
        if history.rate_limited(rule.rate_limit(), now) {
            tracing::debug!(rule_id = %rule.id(), "suppressed by rate limit");
            return Ok(false);
        }

        history.record(rule.rate_limit(), now);
        rule.record_trigger(now);

        if let Err(e) = self
            .rules
            .record_trigger(&rule.id().to_string(), now)
            .await
        {
            tracing::warn!(rule_id = %rule.id(), error = %e, "failed to persist trigger time");
        }
        Ok(true)
    }

    fn slot(&self, rule: &AlertRule) -> HistorySlot {
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history
            .entry(rule.id().clone())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(TriggerHistory::new(
                    rule.last_triggered_at(),
                )))
            })
            .clone()
    }

    /// Drops throttle state for a deleted rule.
    pub fn forget_rule(&self, id: &RuleId) {
        if let Ok(mut history) = self.history.lock() {
            history.remove(id);
        }
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_tz
    }
}
