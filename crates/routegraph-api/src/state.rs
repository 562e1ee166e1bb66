//! Application state: configuration, graph and orchestrator wired together.

use std::path::PathBuf;
use std::sync::Arc;

use routegraph_core::builtin::builtin_runner;
use routegraph_core::collab::boxed::{BoxCapabilityOrchestrator, BoxLegacyPath};
use routegraph_core::condition::ConditionEvaluator;
use routegraph_core::engine::Orchestrator;
use routegraph_core::registry::NodeRegistryBuilder;
use routegraph_infra::collab::{HeuristicCapabilityOrchestrator, TemplateLegacyPath};
use routegraph_infra::config::{load_graph_definition, load_orchestration_config};
use routegraph_types::config::OrchestrationConfig;

/// Shared state for CLI commands.
#[derive(Clone, Debug)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub data_dir: PathBuf,
    /// Whether the graph came from `graph.toml` rather than the built-in one.
    pub custom_graph: bool,
}

impl AppState {
    /// Load configuration and the graph from `data_dir`.
    ///
    /// `overrides` is applied to the loaded configuration before wiring.
    pub async fn init(
        data_dir: PathBuf,
        overrides: impl FnOnce(&mut OrchestrationConfig),
    ) -> anyhow::Result<Self> {
        let mut config = load_orchestration_config(&data_dir).await;
        overrides(&mut config);

        let capability = BoxCapabilityOrchestrator::new(HeuristicCapabilityOrchestrator::new());
        let legacy = BoxLegacyPath::new(TemplateLegacyPath::new());

        let (orchestrator, custom_graph) = match load_graph_definition(&data_dir).await? {
            Some(definition) => {
                let registry = NodeRegistryBuilder::from_definition(definition)?;
                let evaluator =
                    ConditionEvaluator::with_builtin_predicates(config.complexity_threshold);
                let runner = builtin_runner(config.data_flow_validation);
                (
                    Orchestrator::new(config, registry, evaluator, runner, capability, legacy),
                    true,
                )
            }
            None => (
                Orchestrator::with_default_graph(config, capability, legacy)?,
                false,
            ),
        };

        tracing::debug!(
            data_dir = %data_dir.display(),
            custom_graph,
            "application state ready"
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            data_dir,
            custom_graph,
        })
    }
}
