//! Orchestrator: the public entry point of the engine.
//!
//! `Orchestrator` owns the frozen registry, the trace recorder and the
//! fallback controller, and tracks one cancellation token per in-flight
//! correlation id. There is no global state: every collaborator is passed
//! in at construction, so independent orchestrators can coexist in one
//! process (and in parallel tests).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use routegraph_types::config::OrchestrationConfig;
use routegraph_types::error::RegistryError;
use routegraph_types::result::OrchestrationResult;
use routegraph_types::trace::{CompleteTraceability, SystemMetrics, TraceRecord, TraceSnapshot};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builtin::{builtin_runner, default_graph};
use crate::collab::boxed::{BoxCapabilityOrchestrator, BoxLegacyPath};
use crate::condition::ConditionEvaluator;
use crate::dataflow::DataFlowRunner;
use crate::executor::NodeExecutor;
use crate::fallback::{FallbackController, OrchestrationError};
use crate::registry::{NodeRegistry, NodeRegistryBuilder};
use crate::trace::TraceRecorder;
use crate::walker::GraphWalker;

/// Generate a fresh, time-ordered correlation id.
pub fn new_correlation_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Cancellation handle of one running request.
#[derive(Debug, Clone)]
struct InFlight {
    seq: u64,
    token: CancellationToken,
}

/// Releases a request's in-flight entry and trace pin when dropped, so a
/// caller abandoning the future leaves nothing behind.
struct InFlightGuard<'a> {
    inflight: &'a DashMap<String, InFlight>,
    recorder: &'a TraceRecorder,
    correlation_id: &'a str,
    seq: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let seq = self.seq;
        self.inflight
            .remove_if(self.correlation_id, |_, current| current.seq == seq);
        self.recorder.finish_request(self.correlation_id);
    }
}

pub struct Orchestrator {
    controller: FallbackController,
    registry: Arc<NodeRegistry>,
    recorder: Arc<TraceRecorder>,
    config: OrchestrationConfig,
    inflight: DashMap<String, InFlight>,
    next_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Wire an orchestrator from explicit parts.
    pub fn new(
        config: OrchestrationConfig,
        registry: NodeRegistry,
        evaluator: ConditionEvaluator,
        runner: DataFlowRunner,
        capability: BoxCapabilityOrchestrator,
        legacy: BoxLegacyPath,
    ) -> Self {
        let registry = Arc::new(registry);
        let recorder = Arc::new(TraceRecorder::from_config(&config));
        let executor = NodeExecutor::new(
            Arc::clone(&registry),
            evaluator,
            runner,
            capability,
            Arc::clone(&recorder),
            &config,
        );
        let controller = FallbackController::new(
            GraphWalker::new(executor),
            legacy,
            config.fallback_strategy,
            config.enabled,
        );

        tracing::info!(
            enabled = config.enabled,
            strategy = ?config.fallback_strategy,
            traceability = ?config.traceability_mode,
            data_flow_nodes = registry.data_flow_count(),
            decision_nodes = registry.decision_count(),
            "orchestrator ready"
        );

        Self {
            controller,
            registry,
            recorder,
            config,
            inflight: DashMap::new(),
            next_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire an orchestrator over the built-in chat graph and handlers.
    pub fn with_default_graph(
        config: OrchestrationConfig,
        capability: BoxCapabilityOrchestrator,
        legacy: BoxLegacyPath,
    ) -> Result<Self, RegistryError> {
        let registry = NodeRegistryBuilder::from_definition(default_graph())?;
        let evaluator = ConditionEvaluator::with_builtin_predicates(config.complexity_threshold);
        let runner = builtin_runner(config.data_flow_validation);
        Ok(Self::new(config, registry, evaluator, runner, capability, legacy))
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    /// Process one request.
    ///
    /// Never fails under the `graceful` and `hybrid` strategies.
    #[tracing::instrument(skip(self, input, caller_context), fields(correlation_id = correlation_id))]
    pub async fn wire_orchestration(
        &self,
        correlation_id: &str,
        input: Value,
        caller_context: Map<String, Value>,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let token = self.shutdown.child_token();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = InFlight {
            seq,
            token: token.clone(),
        };
        if let Some(previous) = self.inflight.insert(correlation_id.to_string(), entry) {
            tracing::warn!("correlation id already in flight, cancelling the earlier request");
            previous.token.cancel();
        }
        self.recorder.begin_request(correlation_id);
        let _guard = InFlightGuard {
            inflight: &self.inflight,
            recorder: &self.recorder,
            correlation_id,
            seq,
        };

        let result = self
            .controller
            .run(correlation_id, &input, &caller_context, &token)
            .await;

        match &result {
            Ok(res) => tracing::info!(source = ?res.source, fallback = res.fallback, "request complete"),
            Err(err) => tracing::error!(error = %err, "request failed"),
        }
        result
    }

    /// Cancel an in-flight request. Returns `false` if none is running.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        match self.inflight.get(correlation_id) {
            Some(entry) => {
                entry.token.cancel();
                tracing::info!(correlation_id, "request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request and the cleanup task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Ordered trace records of one request.
    pub fn get_traces(&self, correlation_id: &str) -> Vec<TraceRecord> {
        self.recorder.get_traces(correlation_id)
    }

    pub fn get_complete_traceability(&self, correlation_id: &str) -> CompleteTraceability {
        self.recorder.complete_traceability(correlation_id)
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            node_count: self.registry.data_flow_count(),
            tree_size: self.registry.decision_count(),
            active_trace_count: self.recorder.active_trace_count(),
        }
    }

    /// Recent records across requests plus current metrics.
    pub fn export_snapshot(&self) -> TraceSnapshot {
        self.recorder.snapshot(self.get_system_metrics())
    }

    /// Start periodic trace cleanup; it stops on [`Orchestrator::shutdown`].
    pub fn spawn_trace_cleanup(&self) -> JoinHandle<()> {
        self.recorder
            .spawn_cleanup(self.config.cleanup_interval(), self.shutdown.child_token())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("in_flight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}
