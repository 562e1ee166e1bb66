//! Configuration loader for routegraph.
//!
//! Reads `config.toml` from the data directory (`~/.routegraph/` by default)
//! into [`OrchestrationConfig`], falling back to defaults when the file is
//! missing or malformed. The optional `graph.toml` replaces the built-in chat
//! graph; unlike the config file, a malformed graph is a startup error.

use std::path::{Path, PathBuf};

use routegraph_types::config::OrchestrationConfig;
use routegraph_types::node::GraphDefinition;

use crate::filesystem::{config_path, graph_path};

/// Errors raised while loading a graph definition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load orchestration configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`OrchestrationConfig::default()`].
/// - Unreadable or unparsable file: warning, then the default.
pub async fn load_orchestration_config(data_dir: &Path) -> OrchestrationConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return OrchestrationConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return OrchestrationConfig::default();
        }
    };

    match toml::from_str::<OrchestrationConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            OrchestrationConfig::default()
        }
    }
}

/// Replace out-of-range tuning values with their defaults.
fn sanitize(mut config: OrchestrationConfig) -> OrchestrationConfig {
    let defaults = OrchestrationConfig::default();
    if config.capability_timeout_ms == 0 {
        tracing::warn!(
            "capability_timeout_ms must be positive, using {}",
            defaults.capability_timeout_ms
        );
        config.capability_timeout_ms = defaults.capability_timeout_ms;
    }
    if !(0.0..=1.0).contains(&config.complexity_threshold) {
        tracing::warn!(
            "complexity_threshold {} outside [0, 1], using {}",
            config.complexity_threshold,
            defaults.complexity_threshold
        );
        config.complexity_threshold = defaults.complexity_threshold;
    }
    if config.cleanup_interval_secs == 0 {
        config.cleanup_interval_secs = defaults.cleanup_interval_secs;
    }
    config
}

/// Load the graph definition from `{data_dir}/graph.toml`.
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn load_graph_definition(data_dir: &Path) -> Result<Option<GraphDefinition>, ConfigError> {
    let path = graph_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No graph.toml found at {}, using built-in graph", path.display());
            return Ok(None);
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let graph = toml::from_str::<GraphDefinition>(&content)
        .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
    tracing::info!(
        root = graph.root.as_str(),
        decision_nodes = graph.decision_nodes.len(),
        "loaded graph definition from {}",
        path.display()
    );
    Ok(Some(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use routegraph_types::config::{FallbackStrategy, TraceabilityMode};
    use routegraph_types::node::NodeBehavior;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_config_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_orchestration_config(tmp.path()).await;
        assert_eq!(config, OrchestrationConfig::default());
    }

    #[tokio::test]
    async fn valid_config_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
enabled = false
traceability_mode = "essential"
fallback_strategy = "hybrid"
capability_timeout_ms = 5000
"#,
        )
        .await
        .unwrap();

        let config = load_orchestration_config(tmp.path()).await;
        assert!(!config.enabled);
        assert_eq!(config.traceability_mode, TraceabilityMode::Essential);
        assert_eq!(config.fallback_strategy, FallbackStrategy::Hybrid);
        assert_eq!(config.capability_timeout_ms, 5000);
        assert!(config.data_flow_validation);
    }

    #[tokio::test]
    async fn invalid_config_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();
        let config = load_orchestration_config(tmp.path()).await;
        assert_eq!(config, OrchestrationConfig::default());
    }

    #[tokio::test]
    async fn out_of_range_values_are_replaced() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "capability_timeout_ms = 0\ncomplexity_threshold = 3.5\n",
        )
        .await
        .unwrap();
        let config = load_orchestration_config(tmp.path()).await;
        assert_eq!(config.capability_timeout_ms, 25_000);
        assert_eq!(config.complexity_threshold, 0.7);
    }

    #[tokio::test]
    async fn missing_graph_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_graph_definition(tmp.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn graph_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("graph.toml"),
            r#"
root = "gate"

[[data_flow_nodes]]
id = "reply"
kind = "output"
inputs = ["content"]
outputs = ["finalResponse"]

[[decision_nodes]]
id = "gate"
kind = "condition"
predicate = "content.is_question"
true_next = "answer"

[[decision_nodes]]
id = "answer"
kind = "action"
action = { type = "activate", target = "reply" }
"#,
        )
        .await
        .unwrap();

        let graph = load_graph_definition(tmp.path()).await.unwrap().unwrap();
        assert_eq!(graph.root, "gate");
        assert_eq!(graph.data_flow_nodes.len(), 1);
        assert!(matches!(
            graph.decision_nodes[0].behavior,
            NodeBehavior::Condition { ref true_next, .. } if true_next.as_deref() == Some("answer")
        ));
    }

    #[tokio::test]
    async fn malformed_graph_is_an_error() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("graph.toml"), "root = 42")
            .await
            .unwrap();
        let err = load_graph_definition(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("graph.toml"));
    }
}
