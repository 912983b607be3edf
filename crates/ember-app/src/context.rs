use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;

use ember_core::escalation::EscalationPolicy;
use ember_core::rule::RuleDraft;
use ember_ports::error::UseCaseError;
use ember_ports::inbound::{AlertIngestor, EventHandler, IncidentCommands, RuleAuthoring};
use ember_ports::outbound::{AlertRepository, EventPublisher, IncidentRepository, RuleRepository};

use crate::batching::{BatchingConfig, BatchingEngine};
use crate::clock::Clock;
use crate::escalation::EscalationEngine;
use crate::incident_service::IncidentService;
use crate::incident_store::IncidentStore;
use crate::pipeline::SignalPipeline;
use crate::retry::RetryPolicy;
use crate::rule_engine::RuleEngine;
use crate::rule_service::RuleService;
use crate::scheduler::PeriodicTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationConfig {
    pub check_interval: Duration,
    pub default_policy: Option<EscalationPolicy>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            default_policy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub timezone: Tz,
    pub batching: BatchingConfig,
    pub escalation: EscalationConfig,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            batching: BatchingConfig::default(),
            escalation: EscalationConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything the feed and route layers need, built once at startup.
pub struct EngineContext {
    pub events: Arc<dyn EventHandler>,
    pub alerts: Arc<dyn AlertIngestor>,
    pub rules: Arc<dyn RuleAuthoring>,
    pub incidents: Arc<dyn IncidentCommands>,
    pub sweeper: PeriodicTask,
    pub escalator: PeriodicTask,
    pub clock: Arc<dyn Clock>,
}

impl EngineContext {
    /// Wires the engines over one set of repositories. Incident writers
    /// share one [`IncidentStore`]; the other handles are cloned into the
    /// components that need them.
    pub fn assemble<R, A, I, EP>(
        rules: R,
        alerts: A,
        incidents: I,
        publisher: EP,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        R: RuleRepository + Clone + 'static,
        A: AlertRepository + 'static,
        I: IncidentRepository + 'static,
        EP: EventPublisher + Clone + 'static,
    {
        let rule_engine = Arc::new(RuleEngine::new(rules.clone(), config.timezone));
        let incidents = Arc::new(IncidentStore::new(incidents, config.retry));

        let batching = Arc::new(BatchingEngine::new(
            alerts,
            Arc::clone(&incidents),
            publisher.clone(),
            config.batching,
            config.retry,
            Arc::clone(&clock),
        ));

        let escalation = Arc::new(EscalationEngine::new(
            Arc::clone(&incidents),
            rules.clone(),
            publisher.clone(),
            config.escalation.default_policy,
            Arc::clone(&clock),
        ));

        let pipeline = SignalPipeline::new(
            Arc::clone(&rule_engine),
            Arc::clone(&batching),
            publisher.clone(),
            Arc::clone(&clock),
        );

        let sweeper = PeriodicTask::new(
            batching.clone(),
            config.batching.effective_sweep_interval(),
        );
        let escalator = PeriodicTask::new(escalation, config.escalation.check_interval);

        Self {
            events: Arc::new(pipeline),
            alerts: batching,
            rules: Arc::new(RuleService::new(rules, rule_engine, Arc::clone(&clock))),
            incidents: Arc::new(IncidentService::new(
                incidents,
                publisher,
                Arc::clone(&clock),
            )),
            sweeper,
            escalator,
            clock,
        }
    }

    /// Creates every draft, skipping the ones that fail validation.
    pub async fn seed_rules(&self, drafts: Vec<RuleDraft>) -> Result<usize, UseCaseError> {
        let mut created = 0;
        for draft in drafts {
            let name = draft.name.clone();
            match self.rules.create_rule(draft).await {
                Ok(_) => created += 1,
                Err(UseCaseError::Rejected(e)) => {
                    tracing::warn!(rule = %name, error = %e, "skipping invalid rule");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Starts both background loops. Safe to call more than once.
    pub fn start(&self) {
        self.sweeper.start();
        self.escalator.start();
    }

    /// Stops both loops, letting in-flight runs finish.
    pub async fn stop(&self) {
        self.sweeper.stop().await;
        self.escalator.stop().await;
        // Last pass so parked writes get one more chance before exit.
        self.sweeper.run_once().await;
    }
}
