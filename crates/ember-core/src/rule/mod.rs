//! User-authored alert rules.
//!
//! A rule matches events by source and type, filters them with payload
//! conditions and a recurring time window, and carries the throttling and
//! escalation settings the engines apply when it fires. Rules are authored
//! as a [`RuleDraft`] and validated once, when they are created or
//! updated; evaluation itself never rejects a rule for its configuration
//! except for stored data that no longer validates.

pub mod condition;
pub mod template;
pub mod throttle;
pub mod time_window;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::escalation::{EscalationDraft, EscalationPolicy};
use crate::ids::RuleId;
use crate::severity::Severity;
use crate::signal::Event;

pub use condition::{Condition, ConditionValue, Operator};
pub use throttle::{RateLimit, TriggerHistory};
pub use time_window::TimeWindow;

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionLogic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Condition as authored; the operator is still free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDraft {
    pub field: String,
    pub operator: String,
    pub value: ConditionValue,
}

impl TryFrom<ConditionDraft> for Condition {
    type Error = DomainError;

    fn try_from(draft: ConditionDraft) -> Result<Self, Self::Error> {
        let operator: Operator = draft.operator.parse()?;
        Condition::new(draft.field, operator, draft.value)
    }
}

/// Unvalidated rule definition, as submitted by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "wildcard")]
    pub source: String,
    #[serde(default = "wildcard")]
    pub event_type: String,
    #[serde(default)]
    pub conditions: Vec<ConditionDraft>,
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub time_window: TimeWindow,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub escalation: Option<EscalationDraft>,
}

fn default_enabled() -> bool {
    true
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

fn default_severity() -> String {
    "warning".to_string()
}

impl RuleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            source: wildcard(),
            event_type: wildcard(),
            conditions: vec![],
            condition_logic: ConditionLogic::And,
            severity: default_severity(),
            message_template: None,
            labels: BTreeMap::new(),
            cooldown_seconds: 0,
            time_window: TimeWindow::default(),
            rate_limit: RateLimit::default(),
            escalation: None,
        }
    }
}

/// Validated parts of a draft, shared by create and update.
struct Validated {
    name: String,
    description: Option<String>,
    enabled: bool,
    source: String,
    event_type: String,
    conditions: Vec<Condition>,
    condition_logic: ConditionLogic,
    severity: Severity,
    message_template: Option<String>,
    labels: BTreeMap<String, String>,
    cooldown_seconds: u64,
    time_window: TimeWindow,
    rate_limit: RateLimit,
    escalation: EscalationPolicy,
}

fn validate(draft: RuleDraft) -> Result<Validated, DomainError> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::InvalidRule("name is empty".into()));
    }
    let source = draft.source.trim().to_string();
    if source.is_empty() {
        return Err(DomainError::InvalidRule("source is empty".into()));
    }
    let event_type = draft.event_type.trim().to_string();
    if event_type.is_empty() {
        return Err(DomainError::InvalidRule("event_type is empty".into()));
    }

    let conditions = draft
        .conditions
        .into_iter()
        .map(Condition::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    draft.time_window.validate()?;
    draft.rate_limit.validate()?;

    let escalation = match draft.escalation {
        Some(e) => EscalationPolicy::try_from(e)?,
        None => EscalationPolicy::disabled(),
    };

    Ok(Validated {
        name,
        description: draft.description,
        enabled: draft.enabled,
        source,
        event_type,
        conditions,
        condition_logic: draft.condition_logic,
        severity: draft.severity.parse()?,
        message_template: draft.message_template.filter(|t| !t.trim().is_empty()),
        labels: draft.labels,
        cooldown_seconds: draft.cooldown_seconds,
        time_window: draft.time_window,
        rate_limit: draft.rate_limit,
        escalation,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    id: RuleId,
    name: String,
    description: Option<String>,
    enabled: bool,
    source: String,
    event_type: String,
    conditions: Vec<Condition>,
    condition_logic: ConditionLogic,
    severity: Severity,
    message_template: Option<String>,
    labels: BTreeMap<String, String>,
    cooldown_seconds: u64,
    last_triggered_at: Option<DateTime<Utc>>,
    time_window: TimeWindow,
    rate_limit: RateLimit,
    escalation: EscalationPolicy,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn create(draft: RuleDraft, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let v = validate(draft)?;
        Ok(Self {
            id: RuleId::new(),
            name: v.name,
            description: v.description,
            enabled: v.enabled,
            source: v.source,
            event_type: v.event_type,
            conditions: v.conditions,
            condition_logic: v.condition_logic,
            severity: v.severity,
            message_template: v.message_template,
            labels: v.labels,
            cooldown_seconds: v.cooldown_seconds,
            last_triggered_at: None,
            time_window: v.time_window,
            rate_limit: v.rate_limit,
            escalation: v.escalation,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the definition, keeping identity and trigger history.
    pub fn update(&mut self, draft: RuleDraft, now: DateTime<Utc>) -> Result<(), DomainError> {
        let v = validate(draft)?;
        self.name = v.name;
        self.description = v.description;
        self.enabled = v.enabled;
        self.source = v.source;
        self.event_type = v.event_type;
        self.conditions = v.conditions;
        self.condition_logic = v.condition_logic;
        self.severity = v.severity;
        self.message_template = v.message_template;
        self.labels = v.labels;
        self.cooldown_seconds = v.cooldown_seconds;
        self.time_window = v.time_window;
        self.rate_limit = v.rate_limit;
        self.escalation = v.escalation;
        self.updated_at = now;
        Ok(())
    }

    /// Re-checks a stored rule. Used when loading rules written by older
    /// versions or edited outside the authoring path.
    pub fn validate(&self) -> Result<(), DomainError> {
        for condition in &self.conditions {
            condition.validate()?;
        }
        self.time_window.validate()?;
        self.rate_limit.validate()
    }

    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.updated_at = now;
        }
    }

    pub fn record_trigger(&mut self, at: DateTime<Utc>) {
        self.last_triggered_at = Some(at);
    }

    /// Source/type filter with `*` wildcards.
    pub fn targets(&self, event: &Event) -> bool {
        (self.source == WILDCARD || self.source == event.source())
            && (self.event_type == WILDCARD || self.event_type == event.event_type())
    }

    /// Combines condition results with the rule's logic. No conditions means pass.
    pub fn conditions_hold(&self, event: &Event) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let payload = event.payload();
        match self.condition_logic {
            ConditionLogic::And => self.conditions.iter().all(|c| c.evaluate(payload)),
            ConditionLogic::Or => self.conditions.iter().any(|c| c.evaluate(payload)),
        }
    }

    pub fn window_admits(&self, at: DateTime<Utc>, default_tz: Tz) -> Result<bool, DomainError> {
        self.time_window.admits(at, default_tz)
    }

    pub fn id(&self) -> &RuleId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn condition_logic(&self) -> ConditionLogic {
        self.condition_logic
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message_template(&self) -> Option<&str> {
        self.message_template.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at
    }

    pub fn time_window(&self) -> &TimeWindow {
        &self.time_window
    }

    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    pub fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Renders the message for an alert synthesized from `rule` and `event`.
pub fn build_alert_message(rule: &AlertRule, event: &Event) -> String {
    match rule.message_template() {
        Some(t) => template::render(t, event),
        None => template::default_message(rule.name(), event),
    }
}
