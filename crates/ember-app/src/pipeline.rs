use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ember_core::alert::RawAlert;
use ember_core::events::{DomainEvent, RuleTriggered};
use ember_core::signal::Event;
use ember_ports::error::UseCaseError;
use ember_ports::inbound::{AlertIngestor, EventHandler};
use ember_ports::outbound::{EventPublisher, RuleRepository};
use ember_ports::types::IngestOutcome;

use crate::clock::Clock;
use crate::error::AppError;
use crate::rule_engine::RuleEngine;

/// Event in, alerts out: evaluates rules and hands every resulting alert to
/// the batching side.
pub struct SignalPipeline<R, B, EP>
where
    R: RuleRepository,
    B: AlertIngestor + ?Sized,
    EP: EventPublisher,
{
    rules: Arc<RuleEngine<R>>,
    ingestor: Arc<B>,
    events: EP,
    clock: Arc<dyn Clock>,
}

impl<R, B, EP> SignalPipeline<R, B, EP>
where
    R: RuleRepository,
    B: AlertIngestor + ?Sized,
    EP: EventPublisher,
{
    pub fn new(
        rules: Arc<RuleEngine<R>>,
        ingestor: Arc<B>,
        events: EP,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            ingestor,
            events,
            clock,
        }
    }

    pub async fn handle_event(
        &self,
        event: Event,
        now: DateTime<Utc>,
    ) -> Result<Vec<IngestOutcome>, AppError> {
        event.validate()?;
        let matched = self.rules.evaluate_event(&event, now).await?;
        if matched.is_empty() {
            return Ok(vec![]);
        }

        let triggered = matched
            .iter()
            .map(|rule| {
                DomainEvent::RuleTriggered(RuleTriggered {
                    rule_id: rule.id().clone(),
                    rule_name: rule.name().to_string(),
                    event_source: event.source().to_string(),
                    event_type: event.event_type().to_string(),
                    occurred_at: now,
                })
            })
            .collect();
        if let Err(e) = self.events.publish(triggered).await {
            tracing::warn!(error = %e, "failed to publish rule triggers");
        }

        let mut outcomes = Vec::with_capacity(matched.len());
        for rule in &matched {
            let alert = RawAlert::from_rule(rule, &event, now);
            match self.ingestor.ingest_alert(alert).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id(), error = %e, "failed to ingest rule alert");
                }
            }
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl<R, B, EP> EventHandler for SignalPipeline<R, B, EP>
where
    R: RuleRepository,
    B: AlertIngestor + ?Sized,
    EP: EventPublisher,
{
    async fn handle_event(&self, event: Event) -> Result<Vec<IngestOutcome>, UseCaseError> {
        let now = self.clock.now();
        SignalPipeline::handle_event(self, event, now)
            .await
            .map_err(Into::into)
    }
}
