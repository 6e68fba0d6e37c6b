use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// A detection outcome, produced by strategies and delivered by executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            source: source.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Wrap the alert into an `alert` action for the executor queue.
    pub fn into_action(self) -> Action {
        let mut data = Map::new();
        data.insert("title".to_string(), Value::String(self.title));
        data.insert("description".to_string(), Value::String(self.description));
        data.insert("severity".to_string(), Value::String(self.severity.to_string()));
        data.insert("source".to_string(), Value::String(self.source));
        data.insert("timestamp".to_string(), Value::String(self.timestamp.to_rfc3339()));
        for (key, value) in self.data {
            data.entry(key).or_insert(value);
        }
        Action::new("alert", data)
    }

    /// Deduplication signature: alerts for the same title/chain/sender/tx
    /// collapse within a single event's batch.
    pub fn signature(&self) -> String {
        match (
            self.data.get("chain_id"),
            self.data.get("from_address"),
            self.data.get("transaction_hash"),
        ) {
            (Some(chain), Some(from), Some(tx)) => {
                format!(
                    "{}:{}:{}:{}",
                    self.title,
                    sig_part(chain),
                    sig_part(from),
                    sig_part(tx)
                )
            }
            _ => format!("{}:{}:{}", self.title, self.source, self.severity),
        }
    }
}

fn sig_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
