//! Execution trace types.
//!
//! A `TraceRecord` is written once per decision node visited. Records are
//! immutable once appended and grouped by correlation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::CapabilityDecision;
use crate::node::DecisionKind;

/// Outcome of a condition node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub predicate: String,
    pub result: bool,
    pub reasoning: String,
}

/// Timing and resource figures for one node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub latency_ms: u64,
    /// Serialized context size in bytes when performance monitoring is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<u64>,
}

/// One immutable log entry describing a single node's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub node_id: String,
    pub node_kind: DecisionKind,
    /// Action type and target (e.g. `activate:input-analysis`), or the
    /// predicate name for condition nodes.
    pub action: String,
    /// Summary of the context the node received. Shape depends on the
    /// traceability mode.
    pub inputs_summary: Value,
    /// Summary of what the node added to the context.
    pub outputs_summary: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionOutcome>,
    pub performance: PerformanceSample,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub next_nodes: Vec<String>,
}

impl TraceRecord {
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// One activation of a data-flow node, kept in a bounded per-node log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeActivation {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub success: bool,
}

/// Aggregate counters exposed to observability tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Number of registered data-flow nodes.
    pub node_count: usize,
    /// Number of registered decision-tree nodes.
    pub tree_size: usize,
    /// Number of correlation ids with retained traces.
    pub active_trace_count: usize,
}

/// Everything known about one request, for post-hoc debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteTraceability {
    pub correlation_id: String,
    pub traces: Vec<TraceRecord>,
    /// Most recent capability decision taken during the request, if any.
    pub orchestration_decision: Option<CapabilityDecision>,
    /// The subset of `traces` produced by capability nodes.
    pub capability_traces: Vec<TraceRecord>,
}

/// Bounded export of recent trace activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSnapshot {
    pub generated_at: DateTime<Utc>,
    pub metrics: SystemMetrics,
    /// Most recent records across all requests, oldest first.
    pub recent: Vec<TraceRecord>,
}
