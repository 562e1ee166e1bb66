//! Node registry: the immutable store of data-flow and decision nodes.
//!
//! Nodes are registered on a `NodeRegistryBuilder` during startup. `build()`
//! runs structural validation and returns a frozen `NodeRegistry` that has no
//! mutating methods, so it can be shared across concurrent requests behind an
//! `Arc` without locking.
//!
//! Validation checks:
//! - Ids are unique within each map (checked on registration)
//! - A root was designated and exists in the decision map
//! - `true_next` / `false_next` / `children` point at existing decision nodes
//! - `activate` / `fallback` action targets exist in either map
//!
//! Cycles are not a load error: they are reported with a warning here and
//! rejected at runtime by the graph walker, which is the authoritative check.

use std::collections::BTreeMap;
use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use routegraph_types::error::RegistryError;
use routegraph_types::node::{DataFlowNode, DecisionKind, DecisionTreeNode, GraphDefinition};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable registry used only during initialization.
#[derive(Debug, Default)]
pub struct NodeRegistryBuilder {
    data_flow: BTreeMap<String, DataFlowNode>,
    decision: BTreeMap<String, DecisionTreeNode>,
    root: Option<String>,
}

impl NodeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data-flow node. Fails on a duplicate id.
    pub fn register_data_flow_node(&mut self, node: DataFlowNode) -> Result<&mut Self, RegistryError> {
        if self.data_flow.contains_key(&node.id) {
            return Err(RegistryError::DuplicateDataFlowNode(node.id));
        }
        self.data_flow.insert(node.id.clone(), node);
        Ok(self)
    }

    /// Register a decision node. Fails on a duplicate id.
    pub fn register_decision_node(
        &mut self,
        node: DecisionTreeNode,
    ) -> Result<&mut Self, RegistryError> {
        if self.decision.contains_key(&node.id) {
            return Err(RegistryError::DuplicateDecisionNode(node.id));
        }
        self.decision.insert(node.id.clone(), node);
        Ok(self)
    }

    /// Designate the root decision node.
    pub fn with_root(&mut self, root: impl Into<String>) -> &mut Self {
        self.root = Some(root.into());
        self
    }

    /// Register every node of a graph definition and build the registry.
    pub fn from_definition(def: GraphDefinition) -> Result<NodeRegistry, RegistryError> {
        let mut builder = Self::new();
        for node in def.data_flow_nodes {
            builder.register_data_flow_node(node)?;
        }
        for node in def.decision_nodes {
            builder.register_decision_node(node)?;
        }
        builder.with_root(def.root);
        builder.build()
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<NodeRegistry, RegistryError> {
        let root = self.root.clone().ok_or(RegistryError::MissingRoot)?;
        if !self.decision.contains_key(&root) {
            return Err(RegistryError::UnknownRoot(root));
        }

        for node in self.decision.values() {
            for (field, target) in node.referenced_ids() {
                if !self.decision.contains_key(target) {
                    return Err(RegistryError::DanglingReference {
                        node: node.id.clone(),
                        field,
                        target: target.to_string(),
                    });
                }
            }

            // Capability targets name external capabilities, not nodes.
            if node.kind() == DecisionKind::Capability {
                continue;
            }
            if let Some(action) = node.action() {
                let resolvable = self.data_flow.contains_key(&action.target)
                    || self.decision.contains_key(&action.target);
                if action.action_type.requires_runnable_target() && !resolvable {
                    return Err(RegistryError::UnresolvedActionTarget {
                        node: node.id.clone(),
                        target: action.target.clone(),
                    });
                }
            }
        }

        let has_cycle = decision_graph_has_cycle(&self.decision);
        if has_cycle {
            tracing::warn!(
                root = root.as_str(),
                "decision graph contains a cycle; affected walks will abort at runtime"
            );
        }

        tracing::debug!(
            data_flow_nodes = self.data_flow.len(),
            decision_nodes = self.decision.len(),
            root = root.as_str(),
            "node registry frozen"
        );

        Ok(NodeRegistry {
            data_flow: self.data_flow,
            decision: self.decision,
            root,
            has_cycle,
        })
    }
}

/// Build a petgraph view of the decision links and test it for cycles.
fn decision_graph_has_cycle(decision: &BTreeMap<String, DecisionTreeNode>) -> bool {
    let mut graph = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, _> = decision
        .keys()
        .map(|id| (id.as_str(), graph.add_node(id.as_str())))
        .collect();

    for node in decision.values() {
        let from = indices[node.id.as_str()];
        for (_, target) in node.referenced_ids() {
            if let Some(&to) = indices.get(target) {
                graph.add_edge(from, to, ());
            }
        }
    }

    is_cyclic_directed(&graph)
}

// ---------------------------------------------------------------------------
// Frozen registry
// ---------------------------------------------------------------------------

/// Read-only node registry, frozen after initialization.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    data_flow: BTreeMap<String, DataFlowNode>,
    decision: BTreeMap<String, DecisionTreeNode>,
    root: String,
    has_cycle: bool,
}

impl NodeRegistry {
    pub fn get_data_flow_node(&self, id: &str) -> Option<&DataFlowNode> {
        self.data_flow.get(id)
    }

    pub fn get_decision_node(&self, id: &str) -> Option<&DecisionTreeNode> {
        self.decision.get(id)
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    /// Data-flow nodes ordered by id.
    pub fn data_flow_nodes(&self) -> impl Iterator<Item = &DataFlowNode> {
        self.data_flow.values()
    }

    /// Decision nodes ordered by id.
    pub fn decision_nodes(&self) -> impl Iterator<Item = &DecisionTreeNode> {
        self.decision.values()
    }

    pub fn data_flow_count(&self) -> usize {
        self.data_flow.len()
    }

    pub fn decision_count(&self) -> usize {
        self.decision.len()
    }

    /// Whether the static link graph contains a cycle.
    pub fn has_static_cycle(&self) -> bool {
        self.has_cycle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
