use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{RawAlert, RULE_ID_LABEL};

/// Knobs for how alerts are folded into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingPolicy {
    pub group_by_severity: bool,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self {
            group_by_severity: true,
        }
    }
}

/// Deterministic key identifying the group an alert belongs to.
///
/// Derived from the alert source, optionally its severity, and its shared
/// labels. Rule-sourced alerts share only their `ruleId` label so that every
/// alert a rule raises lands together regardless of templated labels; any
/// other alert shares its full label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingKey(String);

impl GroupingKey {
    pub fn for_alert(alert: &RawAlert, policy: &GroupingPolicy) -> Self {
        let mut hasher = DefaultHasher::new();
        alert.source().hash(&mut hasher);
        if policy.group_by_severity {
            alert.severity().as_str().hash(&mut hasher);
        }
        for (k, v) in shared_labels(alert.labels()) {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        Self(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn shared_labels(labels: &BTreeMap<String, String>) -> Vec<(&String, &String)> {
    match labels.get_key_value(RULE_ID_LABEL) {
        Some(pair) => vec![pair],
        None => labels.iter().collect(),
    }
}
