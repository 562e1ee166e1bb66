//! Graph walker: deterministic traversal of the decision graph.
//!
//! The walk is a depth-first preorder over decision nodes driven by an
//! explicit stack. Children are pushed in reverse so they pop in declared
//! order, and a single context is threaded through every visit, so a later
//! sibling always sees what earlier siblings (and their subtrees) wrote.
//!
//! A visited set is kept per walk. Visiting any id a second time aborts the
//! walk with [`WalkError::CycleDetected`], which bounds every walk by the
//! number of decision nodes.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::executor::{NodeError, NodeExecutor};

/// Errors that abort a walk.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalkError {
    #[error("decision node not found: {0}")]
    MissingNode(String),

    #[error("cycle detected: decision node {0} visited twice in one walk")]
    CycleDetected(String),

    #[error("node {node_id} failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("walk cancelled")]
    Cancelled,
}

impl WalkError {
    /// Whether the error is a traversal error rather than a node failure.
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::MissingNode(_) | Self::CycleDetected(_))
    }
}

/// Walks the decision graph through a [`NodeExecutor`].
#[derive(Debug, Clone)]
pub struct GraphWalker {
    executor: NodeExecutor,
}

impl GraphWalker {
    pub fn new(executor: NodeExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &NodeExecutor {
        &self.executor
    }

    /// Walk from `start` and return the final context.
    pub async fn walk(
        &self,
        start: &str,
        mut ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionContext, WalkError> {
        let registry = self.executor.registry();
        let mut stack = vec![start.to_string()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(id) = stack.pop() {
            if cancel.is_cancelled() {
                tracing::info!(
                    correlation_id = ctx.correlation_id(),
                    pending = stack.len() + 1,
                    "walk cancelled, skipping remaining nodes"
                );
                return Err(WalkError::Cancelled);
            }

            if !visited.insert(id.clone()) {
                tracing::warn!(
                    correlation_id = ctx.correlation_id(),
                    node_id = id.as_str(),
                    "cycle detected, aborting walk"
                );
                return Err(WalkError::CycleDetected(id));
            }

            let node = registry
                .get_decision_node(&id)
                .ok_or_else(|| WalkError::MissingNode(id.clone()))?;

            let outcome = match self.executor.execute(node, ctx, cancel).await {
                Ok(outcome) => outcome,
                Err(NodeError::Cancelled) => return Err(WalkError::Cancelled),
                Err(source) => {
                    return Err(WalkError::NodeFailed {
                        node_id: id,
                        source,
                    });
                }
            };

            ctx = outcome.context;
            stack.extend(outcome.next.into_iter().rev());
        }

        tracing::debug!(
            correlation_id = ctx.correlation_id(),
            visited = visited.len(),
            "walk complete"
        );
        Ok(ctx)
    }
}
