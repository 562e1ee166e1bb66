//! Orchestration configuration types.
//!
//! `OrchestrationConfig` is the static configuration surface loaded once at
//! startup from `config.toml`. All fields have defaults, so an empty file (or
//! no file at all) yields a working engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How much detail trace records carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceabilityMode {
    /// Value summaries of inputs and outputs.
    #[default]
    Full,
    /// Key names only.
    Essential,
    /// No summaries; timing, decisions and errors only.
    Minimal,
}

/// What the fallback controller does when a graph walk fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Run the legacy path and return its result, or the apology if it fails.
    #[default]
    Graceful,
    /// Re-raise the original error.
    Strict,
    /// Run the legacy path; if that fails too, return the fixed apology.
    Hybrid,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// When false, every request goes straight to the legacy path.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub traceability_mode: TraceabilityMode,

    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,

    /// Warn when a data-flow node's declared inputs are absent from context.
    #[serde(default = "default_true")]
    pub data_flow_validation: bool,

    /// Record context sizes and warn on nodes slower than expected.
    #[serde(default = "default_true")]
    pub performance_monitoring: bool,

    /// Deadline for a single capability activation.
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,

    /// `complexity.high` is true when `complexityScore` exceeds this value.
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,

    /// Traces older than this are purged by the cleanup task.
    #[serde(default = "default_trace_retention_secs")]
    pub trace_retention_secs: u64,

    /// Maximum number of correlation ids whose traces are retained.
    #[serde(default = "default_max_traced_requests")]
    pub max_traced_requests: usize,

    /// Period of the trace cleanup task.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_capability_timeout_ms() -> u64 {
    25_000
}

fn default_complexity_threshold() -> f64 {
    0.7
}

fn default_trace_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_traced_requests() -> usize {
    1000
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl OrchestrationConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    pub fn trace_retention(&self) -> Duration {
        Duration::from_secs(self.trace_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            traceability_mode: TraceabilityMode::default(),
            fallback_strategy: FallbackStrategy::default(),
            data_flow_validation: true,
            performance_monitoring: true,
            capability_timeout_ms: default_capability_timeout_ms(),
            complexity_threshold: default_complexity_threshold(),
            trace_retention_secs: default_trace_retention_secs(),
            max_traced_requests: default_max_traced_requests(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}
