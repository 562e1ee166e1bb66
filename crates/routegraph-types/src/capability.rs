//! Capability orchestration payloads.
//!
//! Capability nodes hand a `CapabilityRequest` to an external orchestrator and
//! merge the returned `CapabilityDecision` into the execution context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Resource and budget hints passed along with a capability request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadHints {
    /// Quality mode requested by the node (e.g. "enhanced", "standard").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_mode: Option<String>,
    /// Upper bound the caller would like the activation to respect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    /// Relative budget in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
}

/// Request built from context fields by a capability node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(default)]
    pub load_hints: LoadHints,
}

/// Decision returned by the capability orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDecision {
    pub selected_capabilities: Vec<String>,
    /// Predicted confidence in `[0, 1]`.
    pub confidence_prediction: f64,
    /// Predicted response quality in `[0, 1]`.
    pub quality_prediction: f64,
}

/// Errors raised by a capability orchestrator.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("capability orchestrator unavailable: {0}")]
    Unavailable(String),

    #[error("capability activation rejected: {0}")]
    Rejected(String),
}
