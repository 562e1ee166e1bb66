//! Execution context threaded through a graph walk.
//!
//! `ExecutionContext` is the blackboard a request carries from node to node.
//! It holds the original input, caller metadata and every output written by
//! visited nodes. Nodes receive the context by value and hand back an updated
//! copy, so a context is only ever mutated by the node currently holding it.
//!
//! Keys a node may rely on are listed in [`keys`]; everything else is free-form
//! and declared by data-flow node inputs/outputs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Maximum size of a single stored value (1 MB).
pub const MAX_VALUE_SIZE: usize = 1_048_576;

/// Reserved context keys.
pub mod keys {
    /// Message text of the inbound request.
    pub const CONTENT: &str = "content";
    pub const USER_ID: &str = "userId";
    pub const CHANNEL_ID: &str = "channelId";
    /// Prior conversation turns (array).
    pub const HISTORY: &str = "history";
    /// Intent labels produced by input analysis (array of strings).
    pub const INTENTS: &str = "intents";
    /// Set by the orchestrator when the graph path is enabled.
    pub const ORCHESTRATION_ENABLED: &str = "orchestrationEnabled";
    pub const ANALYZED_MESSAGE: &str = "analyzedMessage";
    pub const COMPLEXITY_SCORE: &str = "complexityScore";
    /// Decision merged in by capability nodes.
    pub const CAPABILITY_RESULT: &str = "capabilityResult";
    /// Outputs of the most recently executed data-flow node.
    pub const PREVIOUS_RESULT: &str = "previousResult";
    pub const FINAL_RESPONSE: &str = "finalResponse";
    /// Set to `true` when a fallback node produced the response.
    pub const FALLBACK: &str = "fallback";
    /// Parameters of the action currently being executed.
    pub const ACTION_PARAMETERS: &str = "actionParameters";
}

/// Key-value blackboard for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    correlation_id: String,
    values: Map<String, Value>,
}

impl ExecutionContext {
    /// Create an empty context for a request.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            values: Map::new(),
        }
    }

    /// Create a context from the raw input and caller metadata.
    ///
    /// An object input is spread into the context; any other input is stored
    /// as `content` (strings verbatim). Caller metadata only fills keys the
    /// input did not set.
    pub fn from_request(
        correlation_id: impl Into<String>,
        input: Value,
        caller_context: Map<String, Value>,
    ) -> Self {
        let mut ctx = Self::new(correlation_id);
        match input {
            Value::Object(map) => {
                for (key, value) in map {
                    ctx.set(&key, value);
                }
            }
            Value::Null => {}
            other => ctx.set(keys::CONTENT, other),
        }
        for (key, value) in caller_context {
            if !ctx.contains(&key) {
                ctx.set(&key, value);
            }
        }
        ctx
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Message content, or an empty string when absent.
    pub fn content(&self) -> &str {
        self.get_str(keys::CONTENT).unwrap_or("")
    }

    /// Store a value.
    ///
    /// Values larger than `MAX_VALUE_SIZE` once serialized are replaced with a
    /// truncation marker.
    pub fn set(&mut self, key: &str, value: Value) {
        let size = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
        if size > MAX_VALUE_SIZE {
            tracing::warn!(
                key,
                size,
                max = MAX_VALUE_SIZE,
                "context value exceeds size limit, truncating"
            );
            self.values.insert(
                key.to_string(),
                json!({
                    "_truncated": true,
                    "_original_size": size,
                }),
            );
        } else {
            self.values.insert(key.to_string(), value);
        }
    }

    /// Merge a set of outputs into the context, overwriting existing keys.
    pub fn merge(&mut self, outputs: Map<String, Value>) {
        for (key, value) in outputs {
            self.set(&key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Keys that are new or changed relative to `before`.
    pub fn changes_since(&self, before: &ExecutionContext) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(key, value)| before.values.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Serialized size of all values in bytes.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_string(&self.values)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
