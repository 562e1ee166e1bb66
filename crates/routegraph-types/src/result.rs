//! Request results and legacy-path payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fixed user-facing text returned when every other path has failed.
pub const APOLOGY_MESSAGE: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again in a moment.";

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// The decision graph completed.
    Graph,
    /// The legacy path handled the request.
    Legacy,
    /// The fixed apology payload.
    Apology,
}

/// Result returned by the legacy path collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyResult {
    pub response: String,
    /// Always true; kept in the payload so downstream consumers can tell.
    pub legacy: bool,
    pub timestamp: DateTime<Utc>,
}

impl LegacyResult {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            legacy: true,
            timestamp: Utc::now(),
        }
    }
}

/// Errors raised by the legacy path collaborator.
#[derive(Debug, Clone, Error)]
pub enum LegacyError {
    #[error("legacy path failed: {0}")]
    Failed(String),
}

/// Final result of one orchestrated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub correlation_id: String,
    pub response: String,
    pub source: ResultSource,
    /// True for the apology payload and for graph runs that ended in a
    /// fallback node.
    pub fallback: bool,
    /// Final context of a graph run; `None` for legacy and apology results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationResult {
    /// The fixed apology payload, tagged `fallback: true`.
    pub fn apology(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            response: APOLOGY_MESSAGE.to_string(),
            source: ResultSource::Apology,
            fallback: true,
            context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_legacy(correlation_id: impl Into<String>, legacy: LegacyResult) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            response: legacy.response,
            source: ResultSource::Legacy,
            fallback: false,
            context: None,
            timestamp: legacy.timestamp,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.source == ResultSource::Legacy
    }
}
