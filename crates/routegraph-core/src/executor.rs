//! Node executor: dispatch by decision node kind.
//!
//! `NodeExecutor::execute` runs exactly one decision node and reports which
//! node ids the walker should visit next:
//!
//! - **Condition** -- evaluate the predicate; next is `true_next` or
//!   `false_next` (absent ends the path).
//! - **Action** -- run the target data-flow node and merge its outputs; next is
//!   `children` in declared order. An unresolved target passes the context
//!   through unchanged.
//! - **Capability** -- ask the capability orchestrator (bounded by a deadline),
//!   merge the decision under `capabilityResult`; next is `children`.
//! - **Fallback** -- run the target data-flow node as a terminal step, or emit
//!   the fixed apology when the target does not resolve.
//!
//! Every call appends exactly one trace record, on success and on failure.
//! Failures are recorded with empty `next_nodes` and then returned to the
//! walker unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use routegraph_types::capability::{CapabilityError, CapabilityRequest, LoadHints};
use routegraph_types::config::OrchestrationConfig;
use routegraph_types::node::{DataFlowNode, DecisionTreeNode, NodeAction, NodeBehavior};
use routegraph_types::result::APOLOGY_MESSAGE;
use routegraph_types::trace::{DecisionOutcome, NodeActivation, PerformanceSample, TraceRecord};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::collab::boxed::BoxCapabilityOrchestrator;
use crate::condition::ConditionEvaluator;
use crate::context::{ExecutionContext, keys};
use crate::dataflow::{DataFlowRunner, LeafError};
use crate::registry::NodeRegistry;
use crate::trace::TraceRecorder;

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Errors raised while executing a single node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Leaf(#[from] LeafError),

    #[error("capability activation failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("capability activation timed out after {0} ms")]
    CapabilityTimeout(u64),

    #[error("node execution cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// NodeOutcome
// ---------------------------------------------------------------------------

/// Updated context and the ids to visit next, in order.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub context: ExecutionContext,
    pub next: Vec<String>,
}

// ---------------------------------------------------------------------------
// NodeExecutor
// ---------------------------------------------------------------------------

/// Executes decision nodes and records their traces.
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    registry: Arc<NodeRegistry>,
    evaluator: ConditionEvaluator,
    runner: DataFlowRunner,
    capability: BoxCapabilityOrchestrator,
    recorder: Arc<TraceRecorder>,
    capability_timeout: Duration,
    performance_monitoring: bool,
}

impl NodeExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        evaluator: ConditionEvaluator,
        runner: DataFlowRunner,
        capability: BoxCapabilityOrchestrator,
        recorder: Arc<TraceRecorder>,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            registry,
            evaluator,
            runner,
            capability,
            recorder,
            capability_timeout: config.capability_timeout(),
            performance_monitoring: config.performance_monitoring,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    /// Execute one node and append its trace record.
    pub async fn execute(
        &self,
        node: &DecisionTreeNode,
        ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, NodeError> {
        let start_time = Utc::now();
        let started = Instant::now();
        let before = ctx.clone();
        let mut decision = None;

        let result = match &node.behavior {
            NodeBehavior::Condition {
                predicate,
                true_next,
                false_next,
            } => {
                let eval = self.evaluator.evaluate_with_reasoning(predicate, &ctx);
                let chosen = if eval.result { true_next } else { false_next };
                tracing::debug!(
                    node_id = node.id.as_str(),
                    predicate = predicate.as_str(),
                    result = eval.result,
                    next = ?chosen,
                    "condition evaluated"
                );
                decision = Some(DecisionOutcome {
                    predicate: predicate.clone(),
                    result: eval.result,
                    reasoning: eval.reasoning,
                });
                Ok(NodeOutcome {
                    context: ctx,
                    next: chosen.iter().cloned().collect(),
                })
            }
            NodeBehavior::Action { action } => self.run_action(node, action, ctx, cancel).await,
            NodeBehavior::Capability { action } => {
                self.run_capability(node, action, ctx, cancel).await
            }
            NodeBehavior::Fallback { action } => self.run_fallback(action, ctx, cancel).await,
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        self.record_trace(node, &before, &result, decision, start_time, latency_ms);
        result
    }

    fn record_trace(
        &self,
        node: &DecisionTreeNode,
        before: &ExecutionContext,
        result: &Result<NodeOutcome, NodeError>,
        decision: Option<DecisionOutcome>,
        start_time: chrono::DateTime<Utc>,
        latency_ms: u64,
    ) {
        let action = match &node.behavior {
            NodeBehavior::Condition { predicate, .. } => format!("evaluate:{predicate}"),
            NodeBehavior::Action { action }
            | NodeBehavior::Capability { action }
            | NodeBehavior::Fallback { action } => {
                format!("{}:{}", action.action_type.as_str(), action.target)
            }
        };

        let (outputs_summary, errors, next_nodes, resource_usage) = match result {
            Ok(outcome) => (
                self.recorder.summarize(&outcome.context.changes_since(before)),
                Vec::new(),
                outcome.next.clone(),
                outcome.context.serialized_size(),
            ),
            Err(err) => (
                self.recorder.summarize(&Map::new()),
                vec![err.to_string()],
                Vec::new(),
                before.serialized_size(),
            ),
        };

        let expected = node.metadata.expected_execution_time_ms;
        if self.performance_monitoring && expected > 0 && latency_ms > expected {
            tracing::warn!(
                node_id = node.id.as_str(),
                latency_ms,
                expected_ms = expected,
                "node slower than expected"
            );
        }

        self.recorder.record(TraceRecord {
            timestamp: Utc::now(),
            correlation_id: before.correlation_id().to_string(),
            node_id: node.id.clone(),
            node_kind: node.kind(),
            action,
            inputs_summary: self.recorder.summarize(before.values()),
            outputs_summary,
            decision,
            performance: PerformanceSample {
                start_time,
                end_time: Utc::now(),
                latency_ms,
                resource_usage: self.performance_monitoring.then_some(resource_usage as u64),
            },
            errors,
            next_nodes,
        });
    }

    async fn run_action(
        &self,
        node: &DecisionTreeNode,
        action: &NodeAction,
        ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, NodeError> {
        let context = match self.registry.get_data_flow_node(&action.target) {
            Some(data_node) => self.run_leaf(data_node, action, ctx, cancel).await?,
            None => {
                tracing::warn!(
                    node_id = node.id.as_str(),
                    target = action.target.as_str(),
                    "action target does not resolve to a data-flow node, passing context through"
                );
                ctx
            }
        };
        Ok(NodeOutcome {
            context,
            next: node.children.clone(),
        })
    }

    async fn run_capability(
        &self,
        node: &DecisionTreeNode,
        action: &NodeAction,
        mut ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, NodeError> {
        let request = build_capability_request(node, action, &ctx);
        let timeout_ms = self.capability_timeout.as_millis() as u64;

        tracing::debug!(
            node_id = node.id.as_str(),
            orchestrator = self.capability.name(),
            capability = action.target.as_str(),
            timeout_ms,
            "activating capabilities"
        );

        let call = tokio::time::timeout(self.capability_timeout, self.capability.activate(&request));
        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NodeError::Cancelled),
            result = call => match result {
                Ok(Ok(decision)) => decision,
                Ok(Err(err)) => return Err(NodeError::Capability(err)),
                Err(_elapsed) => return Err(NodeError::CapabilityTimeout(timeout_ms)),
            },
        };

        ctx.set(
            keys::CAPABILITY_RESULT,
            serde_json::to_value(&decision).unwrap_or_default(),
        );
        self.recorder.record_decision(ctx.correlation_id(), decision);

        Ok(NodeOutcome {
            context: ctx,
            next: node.children.clone(),
        })
    }

    async fn run_fallback(
        &self,
        action: &NodeAction,
        ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, NodeError> {
        let mut context = match self.registry.get_data_flow_node(&action.target) {
            Some(data_node) => self.run_leaf(data_node, action, ctx, cancel).await?,
            None => {
                tracing::warn!(
                    target = action.target.as_str(),
                    "fallback target does not resolve, returning apology"
                );
                let mut ctx = ctx;
                ctx.set(keys::FINAL_RESPONSE, Value::String(APOLOGY_MESSAGE.to_string()));
                ctx
            }
        };
        context.set(keys::FALLBACK, Value::Bool(true));
        Ok(NodeOutcome {
            context,
            next: Vec::new(),
        })
    }

    /// Run a data-flow node under the request's cancellation token.
    async fn run_leaf(
        &self,
        data_node: &DataFlowNode,
        action: &NodeAction,
        mut ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionContext, NodeError> {
        let correlation_id = ctx.correlation_id().to_string();
        if !action.parameters.is_empty() {
            ctx.set(keys::ACTION_PARAMETERS, parameters_object(action));
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NodeError::Cancelled),
            result = self.runner.run(data_node, ctx) => result.map_err(NodeError::from),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        self.recorder.record_activation(
            &data_node.id,
            NodeActivation {
                correlation_id,
                timestamp: Utc::now(),
                latency_ms,
                success: result.is_ok(),
            },
        );

        let (mut ctx, _outputs) = result?;
        ctx.remove(keys::ACTION_PARAMETERS);
        Ok(ctx)
    }
}

/// Action parameters as a JSON object. Duplicate keys keep the first value,
/// matching [`NodeAction::parameter`].
fn parameters_object(action: &NodeAction) -> Value {
    let mut params = Map::new();
    for p in &action.parameters {
        params.entry(p.key.clone()).or_insert_with(|| p.value.clone());
    }
    Value::Object(params)
}

/// Build the capability request from context fields and node parameters.
fn build_capability_request(
    node: &DecisionTreeNode,
    action: &NodeAction,
    ctx: &ExecutionContext,
) -> CapabilityRequest {
    let history = match ctx.get(keys::HISTORY) {
        Some(Value::Array(turns)) => turns.clone(),
        _ => Vec::new(),
    };
    let intents = match ctx.get(keys::INTENTS) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };
    let expected = node.metadata.expected_execution_time_ms;

    CapabilityRequest {
        correlation_id: ctx.correlation_id().to_string(),
        user_id: ctx.get_str(keys::USER_ID).map(String::from),
        channel_id: ctx.get_str(keys::CHANNEL_ID).map(String::from),
        content: ctx.content().to_string(),
        history,
        intents,
        load_hints: LoadHints {
            quality_mode: action
                .parameter("quality_mode")
                .and_then(Value::as_str)
                .map(String::from),
            max_latency_ms: action
                .parameter("max_latency_ms")
                .and_then(Value::as_u64)
                .or((expected > 0).then_some(expected)),
            budget: action.parameter("budget").and_then(Value::as_f64),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collab::capability::CapabilityOrchestrator;
    use crate::dataflow::{LeafOutputs, SyncLeaf};
    use crate::registry::NodeRegistryBuilder;
    use crate::registry::tests::{action_node, condition_node, data_node};
    use routegraph_types::capability::CapabilityDecision;
    use routegraph_types::config::TraceabilityMode;
    use routegraph_types::node::{ActionParameter, ActionType, DecisionKind, NodeMetadata};
    use serde_json::json;

    /// Orchestrator returning a fixed decision, optionally after a delay.
    pub(crate) struct StaticOrchestrator {
        pub delay: Duration,
        pub fail: bool,
    }

    impl CapabilityOrchestrator for StaticOrchestrator {
        fn name(&self) -> &str {
            "static"
        }

        async fn activate(
            &self,
            request: &CapabilityRequest,
        ) -> Result<CapabilityDecision, CapabilityError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(CapabilityError::Unavailable("down".to_string()));
            }
            Ok(CapabilityDecision {
                selected_capabilities: vec![
                    request.load_hints.quality_mode.clone().unwrap_or_default(),
                ],
                confidence_prediction: 0.9,
                quality_prediction: 0.8,
            })
        }
    }

    pub(crate) fn capability_node(id: &str, children: &[&str]) -> DecisionTreeNode {
        DecisionTreeNode {
            id: id.to_string(),
            behavior: NodeBehavior::Capability {
                action: NodeAction {
                    action_type: ActionType::Configure,
                    target: "reasoning".to_string(),
                    parameters: vec![ActionParameter {
                        key: "quality_mode".to_string(),
                        value: json!("enhanced"),
                    }],
                },
            },
            children: children.iter().map(|s| s.to_string()).collect(),
            parent: None,
            metadata: NodeMetadata::default(),
        }
    }

    fn fallback_node(id: &str, target: &str) -> DecisionTreeNode {
        DecisionTreeNode {
            id: id.to_string(),
            behavior: NodeBehavior::Fallback {
                action: NodeAction {
                    action_type: ActionType::Configure,
                    target: target.to_string(),
                    parameters: vec![],
                },
            },
            children: vec![],
            parent: None,
            metadata: NodeMetadata::default(),
        }
    }

    fn executor(orchestrator: StaticOrchestrator, timeout_ms: u64) -> NodeExecutor {
        let mut builder = NodeRegistryBuilder::new();
        builder
            .register_data_flow_node(data_node("leaf", &["content"], &["leafOut"]))
            .unwrap();
        builder
            .register_data_flow_node(data_node("broken", &[], &["never"]))
            .unwrap();
        builder
            .register_decision_node(condition_node("root", "custom", Some("act"), None))
            .unwrap();
        builder
            .register_decision_node(action_node("act", "leaf", &["cap"]))
            .unwrap();
        builder
            .register_decision_node(capability_node("cap", &[]))
            .unwrap();
        builder.with_root("root");
        let registry = Arc::new(builder.build().unwrap());

        let runner = DataFlowRunner::new(true)
            .with_handler(
                "leaf",
                Arc::new(SyncLeaf(|_: &DataFlowNode, ctx: &ExecutionContext| {
                    let mut out = LeafOutputs::new();
                    let params = ctx.get(keys::ACTION_PARAMETERS).cloned().unwrap_or(Value::Null);
                    out.insert("leafOut".to_string(), json!({ "params": params }));
                    Ok(out)
                })),
            )
            .with_handler(
                "broken",
                Arc::new(SyncLeaf(|_: &DataFlowNode, _: &ExecutionContext| {
                    Err(LeafError::Failed("leaf exploded".to_string()))
                })),
            );

        let config = OrchestrationConfig {
            capability_timeout_ms: timeout_ms,
            ..OrchestrationConfig::default()
        };
        NodeExecutor::new(
            registry,
            ConditionEvaluator::new().with_predicate("custom", |ctx| ctx.contains("go")),
            runner,
            BoxCapabilityOrchestrator::new(orchestrator),
            Arc::new(TraceRecorder::new(
                TraceabilityMode::Full,
                Duration::from_secs(60),
                100,
            )),
            &config,
        )
    }

    fn quick() -> StaticOrchestrator {
        StaticOrchestrator {
            delay: Duration::ZERO,
            fail: false,
        }
    }

    #[tokio::test]
    async fn condition_routes_and_records_decision() {
        let exec = executor(quick(), 1000);
        let node = exec.registry().get_decision_node("root").unwrap().clone();
        let cancel = CancellationToken::new();

        let mut ctx = ExecutionContext::new("req");
        ctx.set("go", json!(true));
        let outcome = exec.execute(&node, ctx, &cancel).await.unwrap();
        assert_eq!(outcome.next, vec!["act".to_string()]);

        let outcome = exec
            .execute(&node, ExecutionContext::new("req"), &cancel)
            .await
            .unwrap();
        assert!(outcome.next.is_empty());

        let traces = exec.recorder().get_traces("req");
        assert_eq!(traces.len(), 2);
        let decision = traces[0].decision.as_ref().unwrap();
        assert!(decision.result);
        assert_eq!(decision.predicate, "custom");
        assert_eq!(traces[0].action, "evaluate:custom");
        assert!(!traces[1].decision.as_ref().unwrap().result);
    }

    #[tokio::test]
    async fn action_runs_leaf_and_follows_children() {
        let exec = executor(quick(), 1000);
        let node = exec.registry().get_decision_node("act").unwrap().clone();
        let outcome = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.next, vec!["cap".to_string()]);
        assert!(outcome.context.contains("leafOut"));
        assert!(!outcome.context.contains(keys::ACTION_PARAMETERS));

        let activations = exec.recorder().node_activations("leaf");
        assert_eq!(activations.len(), 1);
        assert!(activations[0].success);
    }

    #[tokio::test]
    async fn unresolved_action_target_passes_through() {
        let exec = executor(quick(), 1000);
        // Target exists only as a decision node, so it passes load validation.
        let node = action_node("indirect", "cap", &["cap"]);
        let mut ctx = ExecutionContext::new("req");
        ctx.set("k", json!("v"));
        let outcome = exec
            .execute(&node, ctx.clone(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.context, ctx);
        assert_eq!(outcome.next, vec!["cap".to_string()]);
    }

    #[tokio::test]
    async fn capability_decision_is_merged() {
        let exec = executor(quick(), 1000);
        let node = exec.registry().get_decision_node("cap").unwrap().clone();
        let outcome = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap();
        let result = outcome.context.get(keys::CAPABILITY_RESULT).unwrap();
        assert_eq!(result["selected_capabilities"], json!(["enhanced"]));
        assert!(exec.recorder().orchestration_decision("req").is_some());

        let traces = exec.recorder().get_traces("req");
        assert_eq!(traces[0].node_kind, DecisionKind::Capability);
        assert_eq!(traces[0].action, "configure:reasoning");
    }

    #[tokio::test(start_paused = true)]
    async fn capability_timeout_is_an_error() {
        let slow = StaticOrchestrator {
            delay: Duration::from_secs(30),
            fail: false,
        };
        let exec = executor(slow, 25_000);
        let node = exec.registry().get_decision_node("cap").unwrap().clone();
        let err = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::CapabilityTimeout(25_000)));

        let traces = exec.recorder().get_traces("req");
        assert_eq!(traces.len(), 1);
        assert!(traces[0].is_error());
        assert!(traces[0].next_nodes.is_empty());
    }

    #[tokio::test]
    async fn capability_failure_is_recorded_and_returned() {
        let exec = executor(
            StaticOrchestrator {
                delay: Duration::ZERO,
                fail: true,
            },
            1000,
        );
        let node = exec.registry().get_decision_node("cap").unwrap().clone();
        let err = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Capability(_)));
        assert!(exec.recorder().get_traces("req")[0].errors[0].contains("down"));
    }

    #[tokio::test]
    async fn leaf_failure_is_recorded_with_no_next_nodes() {
        let exec = executor(quick(), 1000);
        let node = action_node("explode", "broken", &["cap"]);
        let err = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Leaf(_)));

        let traces = exec.recorder().get_traces("req");
        assert_eq!(traces.len(), 1);
        assert!(traces[0].errors[0].contains("leaf exploded"));
        assert!(traces[0].next_nodes.is_empty());
        assert!(!exec.recorder().node_activations("broken")[0].success);
    }

    #[tokio::test]
    async fn fallback_without_target_returns_apology() {
        let exec = executor(quick(), 1000);
        let node = fallback_node("fb", "missing");
        let outcome = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.next.is_empty());
        assert_eq!(outcome.context.get_str(keys::FINAL_RESPONSE), Some(APOLOGY_MESSAGE));
        assert_eq!(outcome.context.get_bool(keys::FALLBACK), Some(true));
    }

    #[tokio::test]
    async fn fallback_with_target_runs_leaf_as_terminal() {
        let exec = executor(quick(), 1000);
        let node = fallback_node("fb", "leaf");
        let outcome = exec
            .execute(&node, ExecutionContext::new("req"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.next.is_empty());
        assert!(outcome.context.contains("leafOut"));
        assert_eq!(outcome.context.get_bool(keys::FALLBACK), Some(true));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_leaf() {
        let exec = executor(quick(), 1000);
        let node = exec.registry().get_decision_node("act").unwrap().clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec
            .execute(&node, ExecutionContext::new("req"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Cancelled));
    }

    #[test]
    fn capability_request_reads_context_and_parameters() {
        let node = capability_node("cap", &[]);
        let mut ctx = ExecutionContext::new("req");
        ctx.set(keys::CONTENT, json!("hello"));
        ctx.set(keys::USER_ID, json!("u-1"));
        ctx.set(keys::HISTORY, json!([{ "role": "user", "content": "hi" }]));
        ctx.set(keys::INTENTS, json!(["greeting", 3]));
        let request = build_capability_request(&node, node.action().unwrap(), &ctx);
        assert_eq!(request.content, "hello");
        assert_eq!(request.user_id.as_deref(), Some("u-1"));
        assert!(request.channel_id.is_none());
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.intents, vec!["greeting".to_string()]);
        assert_eq!(request.load_hints.quality_mode.as_deref(), Some("enhanced"));
        assert!(request.load_hints.max_latency_ms.is_none());
    }
}
