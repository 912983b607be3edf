use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;

use ember_app::batching::BatchingConfig;
use ember_app::context::{EngineConfig, EscalationConfig};
use ember_app::retry::RetryPolicy;
use ember_core::alert::GroupingPolicy;
use ember_core::escalation::{EscalationDraft, EscalationPolicy};

/// `database_url` value that selects the in-memory store.
pub const MEMORY_URL: &str = "memory";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// JSON array of rule drafts created at boot.
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    #[serde(default)]
    pub batching: BatchingSection,
    #[serde(default)]
    pub escalation: EscalationSection,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchingSection {
    pub batch_window_seconds: u64,
    pub min_alerts_for_incident: usize,
    pub sweep_interval_seconds: u64,
    pub group_by_severity: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationSection {
    pub check_interval_seconds: u64,
    /// Applied to incidents whose origin rule has no enabled policy.
    pub default_policy: Option<EscalationDraft>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub attempts: u32,
    pub backoff_ms: u64,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            timezone: default_timezone(),
            rules_file: None,
            batching: BatchingSection::default(),
            escalation: EscalationSection::default(),
            retry: RetrySection::default(),
        }
    }
}

impl Default for BatchingSection {
    fn default() -> Self {
        Self {
            batch_window_seconds: 300,
            min_alerts_for_incident: 1,
            sweep_interval_seconds: 30,
            group_by_severity: true,
        }
    }
}

impl Default for EscalationSection {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            default_policy: None,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 200,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_URL
    }

    /// Validates the raw settings and converts them into engine settings.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", self.timezone))?;

        if self.batching.min_alerts_for_incident == 0 {
            anyhow::bail!("batching.min_alerts_for_incident must be at least 1");
        }
        if self.retry.attempts == 0 {
            anyhow::bail!("retry.attempts must be at least 1");
        }

        let default_policy = self
            .escalation
            .default_policy
            .clone()
            .map(EscalationPolicy::try_from)
            .transpose()
            .context("invalid escalation.default_policy")?;

        Ok(EngineConfig {
            timezone,
            batching: BatchingConfig {
                batch_window: chrono::Duration::seconds(self.batching.batch_window_seconds as i64),
                min_alerts_for_incident: self.batching.min_alerts_for_incident,
                sweep_interval: Duration::from_secs(self.batching.sweep_interval_seconds),
                grouping: GroupingPolicy {
                    group_by_severity: self.batching.group_by_severity,
                },
            },
            escalation: EscalationConfig {
                check_interval: Duration::from_secs(self.escalation.check_interval_seconds.max(1)),
                default_policy,
            },
            retry: RetryPolicy {
                attempts: self.retry.attempts,
                backoff: Duration::from_millis(self.retry.backoff_ms),
            },
        })
    }
}
