//! Trace recorder: per-request execution history.
//!
//! The executor appends one `TraceRecord` per decision node visited. Records
//! are grouped by correlation id; each group has its own mutex, so concurrent
//! requests never contend on appends. The map of groups is a `DashMap`, and
//! the cleanup pass only ever takes the map's shard locks, never a group's
//! append lock.
//!
//! Retention:
//! - groups untouched for longer than the retention window are purged by
//!   `purge_expired` (run periodically via `spawn_cleanup`)
//! - at most `max_requests` groups are kept; the least recently appended group
//!   is evicted when a new one would exceed the cap
//! - groups of running requests (between `begin_request` and `finish_request`)
//!   are never evicted or purged, so the cap may be exceeded while they run
//! - per data-flow node activation logs keep the latest `MAX_NODE_ACTIVATIONS`
//! - export snapshots carry the latest `MAX_EXPORT_RECORDS` records

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use routegraph_types::capability::CapabilityDecision;
use routegraph_types::config::{OrchestrationConfig, TraceabilityMode};
use routegraph_types::node::DecisionKind;
use routegraph_types::trace::{
    CompleteTraceability, NodeActivation, SystemMetrics, TraceRecord, TraceSnapshot,
};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Entries kept per data-flow node activation log.
pub const MAX_NODE_ACTIVATIONS: usize = 1000;

/// Records carried by one export snapshot.
pub const MAX_EXPORT_RECORDS: usize = 100;

/// String values longer than this are cut in `full` summaries.
pub const SUMMARY_VALUE_MAX_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// TraceLog
// ---------------------------------------------------------------------------

/// Ordered records for one correlation id.
#[derive(Debug)]
struct TraceLog {
    last_append_ms: AtomicI64,
    records: Mutex<Vec<TraceRecord>>,
}

impl TraceLog {
    fn new() -> Self {
        Self {
            last_append_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            records: Mutex::new(Vec::new()),
        }
    }

    fn last_append_ms(&self) -> i64 {
        self.last_append_ms.load(Ordering::Relaxed)
    }

    fn append(&self, mut record: TraceRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        // Keep the list monotonic even if the wall clock steps backwards.
        if let Some(last) = records.last() {
            if record.timestamp < last.timestamp {
                record.timestamp = last.timestamp;
            }
        }
        self.last_append_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        records.push(record);
    }

    fn snapshot(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// TraceRecorder
// ---------------------------------------------------------------------------

/// Append-only trace store shared by all concurrent requests.
#[derive(Debug)]
pub struct TraceRecorder {
    logs: DashMap<String, Arc<TraceLog>>,
    /// Correlation ids with a running request, and how many are running.
    running: DashMap<String, usize>,
    activations: DashMap<String, VecDeque<NodeActivation>>,
    decisions: DashMap<String, CapabilityDecision>,
    mode: TraceabilityMode,
    retention: Duration,
    max_requests: usize,
}

impl TraceRecorder {
    pub fn new(mode: TraceabilityMode, retention: Duration, max_requests: usize) -> Self {
        Self {
            logs: DashMap::new(),
            running: DashMap::new(),
            activations: DashMap::new(),
            decisions: DashMap::new(),
            mode,
            retention,
            max_requests: max_requests.max(1),
        }
    }

    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self::new(
            config.traceability_mode,
            config.trace_retention(),
            config.max_traced_requests,
        )
    }

    pub fn mode(&self) -> TraceabilityMode {
        self.mode
    }

    /// Summarize a set of context values according to the traceability mode.
    ///
    /// - `full`: the values, with long strings cut to `SUMMARY_VALUE_MAX_CHARS`
    /// - `essential`: sorted key names
    /// - `minimal`: `null`
    pub fn summarize(&self, values: &Map<String, Value>) -> Value {
        match self.mode {
            TraceabilityMode::Full => Value::Object(
                values
                    .iter()
                    .map(|(key, value)| (key.clone(), truncate_value(value)))
                    .collect(),
            ),
            TraceabilityMode::Essential => {
                json!(values.keys().cloned().collect::<Vec<String>>())
            }
            TraceabilityMode::Minimal => Value::Null,
        }
    }

    /// Append a record to its correlation id's trace.
    pub fn record(&self, record: TraceRecord) {
        let correlation_id = record.correlation_id.clone();
        let (log, created) = match self.logs.get(&correlation_id) {
            Some(existing) => (Arc::clone(existing.value()), false),
            None => {
                let entry = self
                    .logs
                    .entry(correlation_id.clone())
                    .or_insert_with(|| Arc::new(TraceLog::new()));
                (Arc::clone(entry.value()), true)
            }
        };

        tracing::trace!(
            correlation_id = correlation_id.as_str(),
            node_id = record.node_id.as_str(),
            errors = record.errors.len(),
            "trace record appended"
        );
        log.append(record);

        if created {
            self.enforce_request_cap(&correlation_id);
        }
    }

    /// Mark a request as running; its trace is pinned until
    /// [`TraceRecorder::finish_request`].
    pub fn begin_request(&self, correlation_id: &str) {
        *self.running.entry(correlation_id.to_string()).or_insert(0) += 1;
    }

    /// Unpin a request's trace and apply the request cap again.
    pub fn finish_request(&self, correlation_id: &str) {
        self.running.remove_if_mut(correlation_id, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
        self.enforce_request_cap(correlation_id);
    }

    pub fn is_running(&self, correlation_id: &str) -> bool {
        self.running.contains_key(correlation_id)
    }

    /// Evict least recently appended traces beyond `max_requests`.
    /// Running requests are skipped.
    fn enforce_request_cap(&self, keep: &str) {
        while self.logs.len() > self.max_requests {
            let oldest = self
                .logs
                .iter()
                .filter(|entry| entry.key() != keep && !self.running.contains_key(entry.key()))
                .min_by_key(|entry| entry.value().last_append_ms())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(id) => {
                    self.logs.remove(&id);
                    self.decisions.remove(&id);
                    tracing::debug!(correlation_id = id.as_str(), "evicted trace over request cap");
                }
                None => break,
            }
        }
    }

    /// Record one activation of a data-flow node.
    pub fn record_activation(&self, node_id: &str, activation: NodeActivation) {
        let mut log = self.activations.entry(node_id.to_string()).or_default();
        if log.len() >= MAX_NODE_ACTIVATIONS {
            log.pop_front();
        }
        log.push_back(activation);
    }

    /// Remember the capability decision taken for a request.
    pub fn record_decision(&self, correlation_id: &str, decision: CapabilityDecision) {
        self.decisions.insert(correlation_id.to_string(), decision);
    }

    /// Ordered trace of one request. Empty if unknown or purged.
    pub fn get_traces(&self, correlation_id: &str) -> Vec<TraceRecord> {
        self.logs
            .get(correlation_id)
            .map(|log| log.value().snapshot())
            .unwrap_or_default()
    }

    /// Recent activations of a data-flow node, oldest first.
    pub fn node_activations(&self, node_id: &str) -> Vec<NodeActivation> {
        self.activations
            .get(node_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn orchestration_decision(&self, correlation_id: &str) -> Option<CapabilityDecision> {
        self.decisions
            .get(correlation_id)
            .map(|d| d.value().clone())
    }

    /// Number of correlation ids with retained traces.
    pub fn active_trace_count(&self) -> usize {
        self.logs.len()
    }

    /// Everything recorded for one request.
    pub fn complete_traceability(&self, correlation_id: &str) -> CompleteTraceability {
        let traces = self.get_traces(correlation_id);
        let capability_traces = traces
            .iter()
            .filter(|r| r.node_kind == DecisionKind::Capability)
            .cloned()
            .collect();
        CompleteTraceability {
            correlation_id: correlation_id.to_string(),
            traces,
            orchestration_decision: self.orchestration_decision(correlation_id),
            capability_traces,
        }
    }

    /// The latest `MAX_EXPORT_RECORDS` records across all requests.
    pub fn snapshot(&self, metrics: SystemMetrics) -> TraceSnapshot {
        let logs: Vec<Arc<TraceLog>> = self
            .logs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut recent: Vec<TraceRecord> = logs.iter().flat_map(|log| log.snapshot()).collect();
        recent.sort_by_key(|r| r.timestamp);
        let skip = recent.len().saturating_sub(MAX_EXPORT_RECORDS);
        TraceSnapshot {
            generated_at: Utc::now(),
            metrics,
            recent: recent.into_iter().skip(skip).collect(),
        }
    }

    /// Drop traces last appended before `cutoff`, except those of running
    /// requests. Returns how many were removed.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let cutoff_ms = cutoff.timestamp_millis();
        let before = self.logs.len();
        self.logs
            .retain(|id, log| log.last_append_ms() >= cutoff_ms || self.running.contains_key(id));
        self.decisions.retain(|id, _| self.logs.contains_key(id));
        before.saturating_sub(self.logs.len())
    }

    /// Drop traces older than the retention window.
    pub fn purge_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        self.purge_before(Utc::now() - retention)
    }

    /// Run `purge_expired` every `interval` until `cancel` fires.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("trace cleanup task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = recorder.purge_expired();
                        if removed > 0 {
                            tracing::info!(removed, "purged expired traces");
                        }
                    }
                }
            }
        })
    }
}

/// Cut long strings for `full` summaries.
fn truncate_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > SUMMARY_VALUE_MAX_CHARS => {
            let cut: String = s.chars().take(SUMMARY_VALUE_MAX_CHARS).collect();
            Value::String(format!("{cut}..."))
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use routegraph_types::trace::PerformanceSample;

    fn record(correlation_id: &str, node_id: &str, kind: DecisionKind) -> TraceRecord {
        let now = Utc::now();
        TraceRecord {
            timestamp: now,
            correlation_id: correlation_id.to_string(),
            node_id: node_id.to_string(),
            node_kind: kind,
            action: "activate:test".to_string(),
            inputs_summary: Value::Null,
            outputs_summary: Value::Null,
            decision: None,
            performance: PerformanceSample {
                start_time: now,
                end_time: now,
                latency_ms: 0,
                resource_usage: None,
            },
            errors: vec![],
            next_nodes: vec![],
        }
    }

    fn recorder(mode: TraceabilityMode) -> TraceRecorder {
        TraceRecorder::new(mode, Duration::from_secs(3600), 10)
    }

    #[test]
    fn records_are_grouped_and_ordered() {
        let rec = recorder(TraceabilityMode::Full);
        rec.record(record("a", "n1", DecisionKind::Action));
        rec.record(record("b", "n1", DecisionKind::Action));
        rec.record(record("a", "n2", DecisionKind::Condition));

        let traces = rec.get_traces("a");
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].node_id, "n1");
        assert_eq!(traces[1].node_id, "n2");
        assert!(traces[0].timestamp <= traces[1].timestamp);
        assert_eq!(rec.active_trace_count(), 2);
        assert!(rec.get_traces("unknown").is_empty());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let rec = recorder(TraceabilityMode::Full);
        let first = record("a", "n1", DecisionKind::Action);
        let mut second = record("a", "n2", DecisionKind::Action);
        second.timestamp = first.timestamp - chrono::Duration::seconds(5);
        rec.record(first.clone());
        rec.record(second);

        let traces = rec.get_traces("a");
        assert_eq!(traces[1].timestamp, first.timestamp);
    }

    #[test]
    fn summaries_follow_mode() {
        let mut values = Map::new();
        values.insert("content".to_string(), json!("x".repeat(500)));
        values.insert("score".to_string(), json!(0.8));

        let full = recorder(TraceabilityMode::Full).summarize(&values);
        let content = full["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), SUMMARY_VALUE_MAX_CHARS + 3);
        assert_eq!(full["score"], json!(0.8));

        let essential = recorder(TraceabilityMode::Essential).summarize(&values);
        assert_eq!(essential, json!(["content", "score"]));

        assert_eq!(recorder(TraceabilityMode::Minimal).summarize(&values), Value::Null);
    }

    #[test]
    fn request_cap_evicts_oldest() {
        let rec = TraceRecorder::new(TraceabilityMode::Minimal, Duration::from_secs(3600), 2);
        rec.record(record("first", "n", DecisionKind::Action));
        std::thread::sleep(Duration::from_millis(5));
        rec.record(record("second", "n", DecisionKind::Action));
        std::thread::sleep(Duration::from_millis(5));
        rec.record(record("third", "n", DecisionKind::Action));

        assert_eq!(rec.active_trace_count(), 2);
        assert!(rec.get_traces("first").is_empty());
        assert_eq!(rec.get_traces("third").len(), 1);
    }

    #[test]
    fn running_requests_survive_request_cap() {
        let rec = TraceRecorder::new(TraceabilityMode::Minimal, Duration::from_secs(3600), 1);
        rec.begin_request("a");
        rec.begin_request("b");
        rec.record(record("a", "root", DecisionKind::Action));
        rec.record(record("b", "root", DecisionKind::Action));
        rec.record(record("a", "second", DecisionKind::Action));
        rec.record(record("b", "second", DecisionKind::Action));

        // Both are running, so the cap is exceeded rather than splitting a trace.
        assert_eq!(rec.get_traces("a").len(), 2);
        assert_eq!(rec.get_traces("b").len(), 2);

        rec.finish_request("a");
        assert_eq!(rec.active_trace_count(), 2);
        rec.finish_request("b");
        assert_eq!(rec.active_trace_count(), 1);
        assert!(rec.get_traces("a").is_empty());
        assert_eq!(rec.get_traces("b").len(), 2);
        assert!(!rec.is_running("b"));
    }

    #[test]
    fn repeated_begin_needs_matching_finish() {
        let rec = recorder(TraceabilityMode::Minimal);
        rec.begin_request("dup");
        rec.begin_request("dup");
        rec.finish_request("dup");
        assert!(rec.is_running("dup"));
        rec.finish_request("dup");
        assert!(!rec.is_running("dup"));
    }

    #[test]
    fn purge_skips_running_requests() {
        let rec = recorder(TraceabilityMode::Minimal);
        rec.begin_request("live");
        rec.record(record("live", "n", DecisionKind::Action));
        rec.record(record("done", "n", DecisionKind::Action));

        let removed = rec.purge_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 1);
        assert_eq!(rec.get_traces("live").len(), 1);
        assert!(rec.get_traces("done").is_empty());
    }

    #[test]
    fn activation_log_is_capped() {
        let rec = recorder(TraceabilityMode::Minimal);
        for i in 0..(MAX_NODE_ACTIVATIONS + 5) {
            rec.record_activation(
                "input-analysis",
                NodeActivation {
                    correlation_id: format!("req-{i}"),
                    timestamp: Utc::now(),
                    latency_ms: 1,
                    success: true,
                },
            );
        }
        let log = rec.node_activations("input-analysis");
        assert_eq!(log.len(), MAX_NODE_ACTIVATIONS);
        assert_eq!(log[0].correlation_id, "req-5");
    }

    #[test]
    fn snapshot_is_capped() {
        let rec = TraceRecorder::new(TraceabilityMode::Minimal, Duration::from_secs(3600), 500);
        for i in 0..(MAX_EXPORT_RECORDS + 20) {
            rec.record(record(&format!("req-{}", i % 7), "n", DecisionKind::Action));
        }
        let metrics = SystemMetrics {
            node_count: 1,
            tree_size: 1,
            active_trace_count: rec.active_trace_count(),
        };
        let snap = rec.snapshot(metrics);
        assert_eq!(snap.recent.len(), MAX_EXPORT_RECORDS);
        assert_eq!(snap.metrics.active_trace_count, 7);
    }

    #[test]
    fn purge_removes_stale_traces_and_decisions() {
        let rec = recorder(TraceabilityMode::Minimal);
        rec.record(record("old", "n", DecisionKind::Capability));
        rec.record_decision(
            "old",
            CapabilityDecision {
                selected_capabilities: vec!["search".to_string()],
                confidence_prediction: 0.9,
                quality_prediction: 0.8,
            },
        );

        assert_eq!(rec.purge_expired(), 0);
        let removed = rec.purge_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 1);
        assert!(rec.get_traces("old").is_empty());
        assert!(rec.orchestration_decision("old").is_none());
    }

    #[test]
    fn complete_traceability_filters_capability_records() {
        let rec = recorder(TraceabilityMode::Minimal);
        rec.record(record("a", "check", DecisionKind::Condition));
        rec.record(record("a", "enhanced", DecisionKind::Capability));
        let all = rec.complete_traceability("a");
        assert_eq!(all.traces.len(), 2);
        assert_eq!(all.capability_traces.len(), 1);
        assert_eq!(all.capability_traces[0].node_id, "enhanced");
        assert!(all.orchestration_decision.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_stops_on_cancel() {
        let rec = Arc::new(recorder(TraceabilityMode::Minimal));
        let cancel = CancellationToken::new();
        let handle = rec.spawn_cleanup(Duration::from_secs(60), cancel.clone());
        tokio::time::advance(Duration::from_secs(120)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
