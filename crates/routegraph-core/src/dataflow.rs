//! Data-flow node execution.
//!
//! `DataFlowRunner` executes the leaf operation behind a data-flow node. The
//! work itself is delegated to a `LeafHandler` registered under the node id;
//! the runner takes care of the contract around it:
//!
//! 1. Optionally warn about declared inputs missing from the context.
//! 2. Run the handler (nodes without a handler produce nothing).
//! 3. Fill every declared output the handler did not produce with a
//!    placeholder, so downstream nodes never miss a key they expect.
//! 4. Merge outputs into the context and record them under `previousResult`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use routegraph_types::node::DataFlowNode;
use serde_json::{Map, Value};

use crate::context::{ExecutionContext, keys};

/// Outputs produced by a leaf operation.
pub type LeafOutputs = Map<String, Value>;

/// Errors raised by a leaf handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LeafError {
    #[error("leaf operation failed: {0}")]
    Failed(String),
}

/// The operation behind a data-flow node.
///
/// Object-safe so handlers of different types can live in one registry.
pub trait LeafHandler: Send + Sync {
    fn run<'a>(
        &'a self,
        node: &'a DataFlowNode,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<LeafOutputs, LeafError>>;
}

/// Adapter turning a synchronous closure into a `LeafHandler`.
pub struct SyncLeaf<F>(pub F);

impl<F> LeafHandler for SyncLeaf<F>
where
    F: Fn(&DataFlowNode, &ExecutionContext) -> Result<LeafOutputs, LeafError> + Send + Sync,
{
    fn run<'a>(
        &'a self,
        node: &'a DataFlowNode,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<LeafOutputs, LeafError>> {
        let result = (self.0)(node, ctx);
        Box::pin(async move { result })
    }
}

/// Placeholder stored for a declared output nobody produced.
pub fn placeholder_output(name: &str) -> Value {
    Value::String(format!("{name}_result"))
}

/// Executes data-flow nodes through their registered handlers.
#[derive(Clone)]
pub struct DataFlowRunner {
    handlers: HashMap<String, Arc<dyn LeafHandler>>,
    validate_inputs: bool,
}

impl DataFlowRunner {
    pub fn new(validate_inputs: bool) -> Self {
        Self {
            handlers: HashMap::new(),
            validate_inputs,
        }
    }

    /// Register the handler for a data-flow node id.
    pub fn with_handler(mut self, node_id: &str, handler: Arc<dyn LeafHandler>) -> Self {
        self.handlers.insert(node_id.to_string(), handler);
        self
    }

    pub fn has_handler(&self, node_id: &str) -> bool {
        self.handlers.contains_key(node_id)
    }

    /// Declared inputs of `node` that are absent from `ctx`.
    pub fn missing_inputs<'a>(node: &'a DataFlowNode, ctx: &ExecutionContext) -> Vec<&'a str> {
        node.inputs
            .iter()
            .filter(|input| !ctx.contains(input))
            .map(String::as_str)
            .collect()
    }

    /// Run a data-flow node and return the updated context plus its outputs.
    pub async fn run(
        &self,
        node: &DataFlowNode,
        mut ctx: ExecutionContext,
    ) -> Result<(ExecutionContext, LeafOutputs), LeafError> {
        if self.validate_inputs {
            let missing = Self::missing_inputs(node, &ctx);
            if !missing.is_empty() {
                tracing::warn!(
                    node_id = node.id.as_str(),
                    correlation_id = ctx.correlation_id(),
                    ?missing,
                    "data-flow node is missing declared inputs"
                );
            }
        }

        let mut outputs = match self.handlers.get(&node.id) {
            Some(handler) => handler.run(node, &ctx).await?,
            None => {
                tracing::debug!(
                    node_id = node.id.as_str(),
                    "no leaf handler registered, declared outputs get placeholders"
                );
                LeafOutputs::new()
            }
        };

        for name in &node.outputs {
            if !outputs.contains_key(name) {
                outputs.insert(name.clone(), placeholder_output(name));
            }
        }

        ctx.merge(outputs.clone());
        ctx.set(keys::PREVIOUS_RESULT, Value::Object(outputs.clone()));
        Ok((ctx, outputs))
    }
}

impl std::fmt::Debug for DataFlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("DataFlowRunner")
            .field("handlers", &ids)
            .field("validate_inputs", &self.validate_inputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::data_node;
    use serde_json::json;

    fn adds(key: &'static str, value: Value) -> Arc<dyn LeafHandler> {
        Arc::new(SyncLeaf(move |_: &DataFlowNode, _: &ExecutionContext| {
            let mut out = LeafOutputs::new();
            out.insert(key.to_string(), value.clone());
            Ok(out)
        }))
    }

    #[tokio::test]
    async fn handler_outputs_are_merged() {
        let runner = DataFlowRunner::new(true).with_handler("a", adds("alpha", json!(1)));
        let node = data_node("a", &[], &["alpha"]);
        let (ctx, outputs) = runner.run(&node, ExecutionContext::new("req")).await.unwrap();
        assert_eq!(ctx.get("alpha"), Some(&json!(1)));
        assert_eq!(outputs.len(), 1);
        assert_eq!(ctx.get(keys::PREVIOUS_RESULT), Some(&json!({ "alpha": 1 })));
    }

    #[tokio::test]
    async fn undeclared_outputs_get_placeholders() {
        let runner = DataFlowRunner::new(false);
        let node = data_node("b", &[], &["summary", "score"]);
        let (ctx, _) = runner.run(&node, ExecutionContext::new("req")).await.unwrap();
        assert_eq!(ctx.get("summary"), Some(&placeholder_output("summary")));
        assert_eq!(ctx.get("score"), Some(&placeholder_output("score")));
    }

    #[tokio::test]
    async fn missing_inputs_are_not_fatal() {
        let runner = DataFlowRunner::new(true).with_handler("c", adds("out", json!("ok")));
        let node = data_node("c", &["content", "history"], &["out"]);
        let ctx = ExecutionContext::new("req");
        assert_eq!(DataFlowRunner::missing_inputs(&node, &ctx), vec!["content", "history"]);
        let (ctx, _) = runner.run(&node, ctx).await.unwrap();
        assert_eq!(ctx.get_str("out"), Some("ok"));
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let failing: Arc<dyn LeafHandler> = Arc::new(SyncLeaf(
            |_: &DataFlowNode, _: &ExecutionContext| Err(LeafError::Failed("boom".to_string())),
        ));
        let runner = DataFlowRunner::new(true).with_handler("d", failing);
        let node = data_node("d", &[], &["x"]);
        let err = runner.run(&node, ExecutionContext::new("req")).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
