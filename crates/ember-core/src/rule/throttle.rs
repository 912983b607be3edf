use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Cap on triggers per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_count() -> u32 {
    1
}

fn default_window_seconds() -> u64 {
    60
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_count(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl RateLimit {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.enabled {
            return Ok(());
        }
        if self.count == 0 {
            return Err(DomainError::InvalidRateLimit("count must be at least 1".into()));
        }
        if self.window_seconds == 0 {
            return Err(DomainError::InvalidRateLimit(
                "window_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_seconds.min(i64::MAX as u64) as i64)
    }
}

/// Per-rule trigger bookkeeping backing the cooldown and rate-limit gates.
#[derive(Debug, Clone, Default)]
pub struct TriggerHistory {
    last_triggered_at: Option<DateTime<Utc>>,
    recent: VecDeque<DateTime<Utc>>,
}

impl TriggerHistory {
    pub fn new(last_triggered_at: Option<DateTime<Utc>>) -> Self {
        Self {
            last_triggered_at,
            recent: VecDeque::new(),
        }
    }

    /// Adopts a newer persisted trigger time (another process, or a restart).
    pub fn observe_persisted(&mut self, persisted: Option<DateTime<Utc>>) {
        if persisted > self.last_triggered_at {
            self.last_triggered_at = persisted;
        }
    }

    pub fn in_cooldown(&self, cooldown_seconds: u64, now: DateTime<Utc>) -> bool {
        if cooldown_seconds == 0 {
            return false;
        }
        match self.last_triggered_at {
            Some(last) => now - last < Duration::seconds(cooldown_seconds as i64),
            None => false,
        }
    }

    /// Prunes history to the trailing window and reports whether the limit is reached.
    pub fn rate_limited(&mut self, limit: &RateLimit, now: DateTime<Utc>) -> bool {
        if !limit.enabled {
            return false;
        }
        let window = limit.window();
        while let Some(oldest) = self.recent.front() {
            if now - *oldest >= window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.len() >= limit.count as usize
    }

    pub fn record(&mut self, limit: &RateLimit, now: DateTime<Utc>) {
        self.last_triggered_at = Some(now);
        if limit.enabled {
            self.recent.push_back(now);
            while self.recent.len() > limit.count as usize {
                self.recent.pop_front();
            }
        }
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at
    }

    pub fn recent_count(&self) -> usize {
        self.recent.len()
    }
}
