//! Fallback controller: the single authority on final disposition.
//!
//! When orchestration is disabled every request goes straight to the legacy
//! path. When it is enabled the decision graph is walked from the root, and
//! any walk error is resolved according to the configured strategy:
//!
//! | strategy   | walk error                                  |
//! |------------|---------------------------------------------|
//! | `graceful` | legacy path result (apology if it fails)    |
//! | `strict`   | original error returned to the caller       |
//! | `hybrid`   | legacy path result, apology if it fails     |
//!
//! A cancelled walk never reaches the legacy path: the caller gave up on
//! the request, so only the apology (or the error, under `strict`) is
//! produced.

use routegraph_types::config::FallbackStrategy;
use routegraph_types::result::{LegacyError, OrchestrationResult, ResultSource};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::collab::boxed::BoxLegacyPath;
use crate::context::{ExecutionContext, keys};
use crate::walker::{GraphWalker, WalkError};

/// Errors that escape the controller (only under `strict`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Legacy(#[from] LegacyError),
}

/// Chooses between the graph, the legacy path and the apology.
#[derive(Debug, Clone)]
pub struct FallbackController {
    walker: GraphWalker,
    legacy: BoxLegacyPath,
    strategy: FallbackStrategy,
    enabled: bool,
}

impl FallbackController {
    pub fn new(
        walker: GraphWalker,
        legacy: BoxLegacyPath,
        strategy: FallbackStrategy,
        enabled: bool,
    ) -> Self {
        Self {
            walker,
            legacy,
            strategy,
            enabled,
        }
    }

    pub fn walker(&self) -> &GraphWalker {
        &self.walker
    }

    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Process one request end to end.
    pub async fn run(
        &self,
        correlation_id: &str,
        input: &Value,
        context: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        if !self.enabled {
            tracing::debug!(correlation_id, "orchestration disabled, using legacy path");
            return self.run_legacy(correlation_id, input, context).await;
        }

        let mut ctx = ExecutionContext::from_request(correlation_id, input.clone(), context.clone());
        ctx.set(keys::ORCHESTRATION_ENABLED, Value::Bool(true));

        let root = self.walker.executor().registry().root_id();
        let err = match self.walker.walk(root, ctx, cancel).await {
            Ok(ctx) => return Ok(graph_result(correlation_id, ctx)),
            Err(err) => err,
        };

        tracing::warn!(
            correlation_id,
            error = %err,
            strategy = ?self.strategy,
            "graph walk failed"
        );

        match self.strategy {
            FallbackStrategy::Strict => Err(err.into()),
            FallbackStrategy::Graceful | FallbackStrategy::Hybrid => {
                if matches!(err, WalkError::Cancelled) {
                    return Ok(OrchestrationResult::apology(correlation_id));
                }
                match self.legacy.process(correlation_id, input, context).await {
                    Ok(legacy) => Ok(OrchestrationResult::from_legacy(correlation_id, legacy)),
                    Err(legacy_err) => {
                        tracing::error!(
                            correlation_id,
                            error = %legacy_err,
                            "legacy path failed after graph failure, returning apology"
                        );
                        Ok(OrchestrationResult::apology(correlation_id))
                    }
                }
            }
        }
    }

    async fn run_legacy(
        &self,
        correlation_id: &str,
        input: &Value,
        context: &Map<String, Value>,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        match self.legacy.process(correlation_id, input, context).await {
            Ok(legacy) => Ok(OrchestrationResult::from_legacy(correlation_id, legacy)),
            Err(err) if self.strategy == FallbackStrategy::Strict => Err(err.into()),
            Err(err) => {
                tracing::error!(correlation_id, error = %err, "legacy path failed, returning apology");
                Ok(OrchestrationResult::apology(correlation_id))
            }
        }
    }
}

/// Build the result of a completed walk.
fn graph_result(correlation_id: &str, ctx: ExecutionContext) -> OrchestrationResult {
    let fallback = ctx.get_bool(keys::FALLBACK).unwrap_or(false);
    let response = match ctx.get(keys::FINAL_RESPONSE) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => {
            tracing::debug!(correlation_id, "walk finished without a final response");
            String::new()
        }
    };
    OrchestrationResult {
        correlation_id: correlation_id.to_string(),
        response,
        source: ResultSource::Graph,
        fallback,
        context: Some(ctx.into_values()),
        timestamp: chrono::Utc::now(),
    }
}
