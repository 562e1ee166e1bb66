//! Graph node types for routegraph.
//!
//! Two node families make up an orchestration graph:
//! - `DataFlowNode` -- leaf operations with declared inputs/outputs and cost
//!   metadata, invoked by action and capability nodes.
//! - `DecisionTreeNode` -- the control-flow graph. Its behavior is a closed
//!   enum (`NodeBehavior`) so every dispatch site is checked for exhaustiveness.
//!
//! `GraphDefinition` is the serializable bundle of both families plus the root
//! id, used when a graph is loaded from a file instead of the built-in default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Data-flow nodes
// ---------------------------------------------------------------------------

/// The role a data-flow node plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlowKind {
    Input,
    Processor,
    Decision,
    Output,
    Fallback,
}

/// Cost metadata attached to a data-flow node.
///
/// `latency_ms` is a scheduling hint for capacity planning and upstream
/// timeouts; it is never enforced as a sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMetadata {
    #[serde(default)]
    pub latency_ms: u64,
    /// Expected success ratio in `[0, 1]`.
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    /// Relative resource cost in `[0, 1]`.
    #[serde(default)]
    pub resource_cost: f64,
}

fn default_reliability() -> f64 {
    1.0
}

impl Default for CostMetadata {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            reliability: default_reliability(),
            resource_cost: 0.0,
        }
    }
}

/// A leaf operation with declared inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowNode {
    /// Unique key within the data-flow registry.
    pub id: String,
    pub kind: DataFlowKind,
    /// Context keys this node reads.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Context keys this node writes.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Input name -> output name mapping. Documentation only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transformations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_condition: Option<String>,
    #[serde(default)]
    pub metadata: CostMetadata,
}

// ---------------------------------------------------------------------------
// Decision-tree nodes
// ---------------------------------------------------------------------------

/// Flat discriminant of a decision node, used in trace records and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Condition,
    Action,
    Capability,
    Fallback,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Condition => "condition",
            DecisionKind::Action => "action",
            DecisionKind::Capability => "capability",
            DecisionKind::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action descriptor asks the executor to do with its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Activate,
    Deactivate,
    Configure,
    Fallback,
}

impl ActionType {
    /// Whether the target must resolve to a runnable node at load time.
    pub fn requires_runnable_target(&self) -> bool {
        matches!(self, ActionType::Activate | ActionType::Fallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Activate => "activate",
            ActionType::Deactivate => "deactivate",
            ActionType::Configure => "configure",
            ActionType::Fallback => "fallback",
        }
    }
}

/// A single ordered action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub key: String,
    pub value: Value,
}

/// Action descriptor carried by action, capability and fallback nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Data-flow node id, decision node id, or capability id.
    pub target: String,
    /// Ordered parameters; order is preserved from the definition.
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
}

impl NodeAction {
    /// Look up a parameter by key (first match wins).
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }
}

/// Per-node tuning metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub expected_execution_time_ms: u64,
    /// Historical success ratio in `[0, 1]`.
    #[serde(default = "default_reliability")]
    pub historical_success_rate: f64,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            priority: 0,
            expected_execution_time_ms: 0,
            historical_success_rate: default_reliability(),
        }
    }
}

/// Kind-specific behavior of a decision node.
///
/// Internally tagged by `kind`:
/// ```toml
/// [[decision_nodes]]
/// id = "complexity-check"
/// kind = "condition"
/// predicate = "complexity.high"
/// true_next = "enhanced-processing"
/// false_next = "standard-processing"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBehavior {
    /// Branch on a named predicate.
    Condition {
        predicate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        true_next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        false_next: Option<String>,
    },
    /// Run a data-flow node, then continue into children.
    Action { action: NodeAction },
    /// Ask the capability orchestrator for a decision, then continue into children.
    Capability { action: NodeAction },
    /// Run a terminal fallback data-flow node.
    Fallback { action: NodeAction },
}

/// A node in the decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeNode {
    pub id: String,
    #[serde(flatten)]
    pub behavior: NodeBehavior,
    /// Ids executed, in order, after this node resolves.
    #[serde(default)]
    pub children: Vec<String>,
    /// Back-reference for diagnostics; never used for traversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl DecisionTreeNode {
    pub fn kind(&self) -> DecisionKind {
        match &self.behavior {
            NodeBehavior::Condition { .. } => DecisionKind::Condition,
            NodeBehavior::Action { .. } => DecisionKind::Action,
            NodeBehavior::Capability { .. } => DecisionKind::Capability,
            NodeBehavior::Fallback { .. } => DecisionKind::Fallback,
        }
    }

    /// The action descriptor, if this node carries one.
    pub fn action(&self) -> Option<&NodeAction> {
        match &self.behavior {
            NodeBehavior::Condition { .. } => None,
            NodeBehavior::Action { action }
            | NodeBehavior::Capability { action }
            | NodeBehavior::Fallback { action } => Some(action),
        }
    }

    /// Every decision-node id this node links to (branches and children).
    pub fn referenced_ids(&self) -> Vec<(&'static str, &str)> {
        let mut refs = Vec::new();
        if let NodeBehavior::Condition {
            true_next,
            false_next,
            ..
        } = &self.behavior
        {
            if let Some(id) = true_next {
                refs.push(("true_next", id.as_str()));
            }
            if let Some(id) = false_next {
                refs.push(("false_next", id.as_str()));
            }
        }
        refs.extend(self.children.iter().map(|c| ("children", c.as_str())));
        refs
    }
}

// ---------------------------------------------------------------------------
// Graph definition
// ---------------------------------------------------------------------------

/// Serializable bundle of a complete orchestration graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Id of the designated root decision node.
    pub root: String,
    #[serde(default)]
    pub data_flow_nodes: Vec<DataFlowNode>,
    #[serde(default)]
    pub decision_nodes: Vec<DecisionTreeNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(id: &str, t: Option<&str>, f: Option<&str>) -> DecisionTreeNode {
        DecisionTreeNode {
            id: id.to_string(),
            behavior: NodeBehavior::Condition {
                predicate: "complexity.high".to_string(),
                true_next: t.map(String::from),
                false_next: f.map(String::from),
            },
            children: vec![],
            parent: None,
            metadata: NodeMetadata::default(),
        }
    }

    #[test]
    fn kind_follows_behavior() {
        let node = condition("check", None, None);
        assert_eq!(node.kind(), DecisionKind::Condition);
        assert!(node.action().is_none());
    }

    #[test]
    fn referenced_ids_include_branches_and_children() {
        let mut node = condition("check", Some("a"), Some("b"));
        node.children = vec!["c".to_string()];
        let refs: Vec<&str> = node.referenced_ids().into_iter().map(|(_, id)| id).collect();
        assert_eq!(refs, vec!["a", "b", "c"]);
    }

    #[test]
    fn action_parameter_lookup_preserves_first_match() {
        let action = NodeAction {
            action_type: ActionType::Configure,
            target: "capability-orchestrator".to_string(),
            parameters: vec![
                ActionParameter {
                    key: "quality_mode".to_string(),
                    value: json!("enhanced"),
                },
                ActionParameter {
                    key: "quality_mode".to_string(),
                    value: json!("ignored"),
                },
            ],
        };
        assert_eq!(action.parameter("quality_mode"), Some(&json!("enhanced")));
        assert_eq!(action.parameter("missing"), None);
    }

    #[test]
    fn only_activate_and_fallback_need_runnable_targets() {
        assert!(ActionType::Activate.requires_runnable_target());
        assert!(ActionType::Fallback.requires_runnable_target());
        assert!(!ActionType::Configure.requires_runnable_target());
        assert!(!ActionType::Deactivate.requires_runnable_target());
    }

    #[test]
    fn graph_definition_parses_from_toml() {
        let toml_str = r#"
root = "check"

[[data_flow_nodes]]
id = "response-generator"
kind = "output"
inputs = ["analyzedMessage"]
outputs = ["finalResponse"]

[data_flow_nodes.metadata]
latency_ms = 1500
reliability = 0.95
resource_cost = 0.4

[[decision_nodes]]
id = "check"
kind = "condition"
predicate = "complexity.high"
true_next = "respond"

[[decision_nodes]]
id = "respond"
kind = "action"
parent = "check"

[decision_nodes.action]
type = "activate"
target = "response-generator"
parameters = [{ key = "quality_mode", value = "standard" }]
"#;
        let def: GraphDefinition = toml::from_str(toml_str).unwrap();
        assert_eq!(def.root, "check");
        assert_eq!(def.data_flow_nodes[0].metadata.latency_ms, 1500);
        assert_eq!(def.decision_nodes.len(), 2);
        assert_eq!(def.decision_nodes[0].kind(), DecisionKind::Condition);
        let action = def.decision_nodes[1].action().unwrap();
        assert_eq!(action.action_type, ActionType::Activate);
        assert_eq!(action.parameter("quality_mode"), Some(&json!("standard")));
        assert_eq!(def.decision_nodes[1].metadata.historical_success_rate, 1.0);
    }
}
