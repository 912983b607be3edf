use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::severity::Severity;

/// Raise an unresolved incident to `to_severity` once it is `after_minutes` old.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    enabled: bool,
    after_minutes: u64,
    to_severity: Severity,
}

impl EscalationPolicy {
    pub fn new(enabled: bool, after_minutes: u64, to_severity: Severity) -> Self {
        Self {
            enabled,
            after_minutes,
            to_severity,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0, Severity::Critical)
    }

    pub fn threshold(&self) -> Duration {
        Duration::minutes(self.after_minutes.min(i64::MAX as u64 / 60_000) as i64)
    }

    /// True when an incident opened at `created_at` with `current` severity
    /// should be raised at `now`. Never true for a policy that would lower
    /// or keep the severity, which makes repeated scans idempotent.
    pub fn is_due(&self, created_at: DateTime<Utc>, current: Severity, now: DateTime<Utc>) -> bool {
        self.enabled && now - created_at >= self.threshold() && current < self.to_severity
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn after_minutes(&self) -> u64 {
        self.after_minutes
    }

    pub fn to_severity(&self) -> Severity {
        self.to_severity
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Unvalidated escalation settings as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDraft {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub after_minutes: u64,
    #[serde(default = "default_to_severity")]
    pub to_severity: String,
}

fn default_to_severity() -> String {
    "critical".to_string()
}

impl TryFrom<EscalationDraft> for EscalationPolicy {
    type Error = DomainError;

    fn try_from(draft: EscalationDraft) -> Result<Self, Self::Error> {
        Ok(Self::new(
            draft.enabled,
            draft.after_minutes,
            draft.to_severity.parse()?,
        ))
    }
}
