//! Dotted-path lookup into an event payload.
//!
//! `"host.disks.0.free"` walks object keys and, for numeric segments,
//! array indices. The lookup never fails; it reports [`Resolved::Missing`]
//! when any segment is absent, when an intermediate value is a scalar, or
//! when the final value is JSON `null`.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Found(&'a Value),
    Missing,
}

impl<'a> Resolved<'a> {
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Self::Found(v) => Some(v),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

pub fn resolve<'a>(root: &'a Value, path: &str) -> Resolved<'a> {
    let path = path.trim();
    if path.is_empty() {
        return Resolved::Missing;
    }
    walk(root, path.split('.'))
}

fn walk<'a, 'p>(current: &'a Value, mut segments: impl Iterator<Item = &'p str>) -> Resolved<'a> {
    let Some(segment) = segments.next() else {
        return match current {
            Value::Null => Resolved::Missing,
            other => Resolved::Found(other),
        };
    };

    let next = match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };

    match next {
        Some(value) => walk(value, segments),
        None => Resolved::Missing,
    }
}

/// String rendering used by `contains` comparisons and message templates.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric coercion: numbers as-is, numeric strings parsed, everything else `None`.
pub fn coerce_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        _ => None,
    }
}
