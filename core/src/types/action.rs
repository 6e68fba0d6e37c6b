use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work handed from strategies to executors.
///
/// The `kind` tag tells executors what the payload means; the data map is
/// frozen at construction and moves through the action queue untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    data: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { kind: kind.into(), data }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Action(kind={}, keys={})", self.kind, self.data.len())
    }
}
