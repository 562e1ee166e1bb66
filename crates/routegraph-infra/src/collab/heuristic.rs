//! Rule-based capability orchestrator.
//!
//! Selects capabilities from the request's intents, history and load hints
//! without calling out to any service. Useful as the default orchestrator
//! and as a stand-in when the real one is not deployed.

use routegraph_core::collab::capability::CapabilityOrchestrator;
use routegraph_types::capability::{CapabilityDecision, CapabilityError, CapabilityRequest};

/// Latency hint below which expensive capabilities are skipped.
const FAST_PATH_LATENCY_MS: u64 = 1_000;

const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Default)]
pub struct HeuristicCapabilityOrchestrator;

impl HeuristicCapabilityOrchestrator {
    pub fn new() -> Self {
        Self
    }

    fn select(request: &CapabilityRequest) -> Vec<String> {
        let hints = &request.load_hints;
        let enhanced = hints.quality_mode.as_deref() == Some("enhanced");
        let fast_path = hints
            .max_latency_ms
            .is_some_and(|ms| ms < FAST_PATH_LATENCY_MS);

        let mut selected = Vec::new();
        if request.intents.iter().any(|i| i == "question") {
            selected.push("reasoning".to_string());
        }
        if !request.history.is_empty() {
            selected.push("memory".to_string());
        }
        if enhanced && !fast_path {
            selected.push("deep_analysis".to_string());
        }
        if selected.is_empty() {
            selected.push("conversation".to_string());
        }
        selected
    }
}

impl CapabilityOrchestrator for HeuristicCapabilityOrchestrator {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn activate(
        &self,
        request: &CapabilityRequest,
    ) -> Result<CapabilityDecision, CapabilityError> {
        if request.load_hints.budget.is_some_and(|b| b <= 0.0) {
            return Err(CapabilityError::Rejected("budget exhausted".to_string()));
        }

        let selected = Self::select(request);
        let confidence = (0.6 + 0.1 * selected.len() as f64).min(MAX_CONFIDENCE);
        let quality = match request.load_hints.quality_mode.as_deref() {
            Some("enhanced") => 0.9,
            _ => 0.75,
        };

        tracing::debug!(
            correlation_id = request.correlation_id.as_str(),
            selected = ?selected,
            confidence,
            "capabilities selected"
        );

        Ok(CapabilityDecision {
            selected_capabilities: selected,
            confidence_prediction: confidence,
            quality_prediction: quality,
        })
    }
}
