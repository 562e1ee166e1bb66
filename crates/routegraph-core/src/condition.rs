//! Named predicate registry for condition nodes.
//!
//! Condition nodes refer to predicates by name. `ConditionEvaluator` maps each
//! name to a function of the execution context alone, so an evaluation can be
//! replayed from a recorded trace. Tuning values such as the complexity
//! threshold are captured when the predicate is registered.
//!
//! Unknown predicate names evaluate to `false` with a warning, so a typo in a
//! graph definition never takes a branch it was not meant to.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{ExecutionContext, keys};

/// Gate for the graph path as a whole.
pub const ORCHESTRATION_ENABLED: &str = "autonomous_orchestration.enabled";
/// True when `complexityScore` exceeds the configured threshold.
pub const COMPLEXITY_HIGH: &str = "complexity.high";
pub const CONTENT_IS_QUESTION: &str = "content.is_question";
pub const HISTORY_PRESENT: &str = "history.present";

/// A predicate over the execution context.
pub type Predicate = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// Result of evaluating a predicate, with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: bool,
    pub reasoning: String,
}

/// Registry of named predicates.
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    predicates: HashMap<String, Predicate>,
}

impl ConditionEvaluator {
    /// Create an evaluator with no predicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator with the built-in chat predicates registered.
    pub fn with_builtin_predicates(complexity_threshold: f64) -> Self {
        Self::new()
            .with_predicate(ORCHESTRATION_ENABLED, |ctx| {
                ctx.get_bool(keys::ORCHESTRATION_ENABLED).unwrap_or(false)
            })
            .with_predicate(COMPLEXITY_HIGH, move |ctx| {
                ctx.get_f64(keys::COMPLEXITY_SCORE)
                    .is_some_and(|score| score > complexity_threshold)
            })
            .with_predicate(CONTENT_IS_QUESTION, |ctx| {
                ctx.content().trim_end().ends_with('?')
            })
            .with_predicate(HISTORY_PRESENT, |ctx| match ctx.get(keys::HISTORY) {
                Some(Value::Array(turns)) => !turns.is_empty(),
                _ => false,
            })
    }

    /// Register (or replace) a predicate.
    pub fn with_predicate<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.to_string(), Arc::new(predicate));
        self
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Registered predicate names, sorted.
    pub fn predicate_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a predicate. Unknown names evaluate to `false`.
    pub fn evaluate(&self, name: &str, ctx: &ExecutionContext) -> bool {
        self.evaluate_with_reasoning(name, ctx).result
    }

    /// Evaluate a predicate and explain the outcome for the trace.
    pub fn evaluate_with_reasoning(&self, name: &str, ctx: &ExecutionContext) -> Evaluation {
        match self.predicates.get(name) {
            Some(predicate) => {
                let result = predicate(ctx);
                Evaluation {
                    result,
                    reasoning: format!("predicate '{name}' evaluated to {result}"),
                }
            }
            None => {
                tracing::warn!(
                    predicate = name,
                    correlation_id = ctx.correlation_id(),
                    "unknown predicate, defaulting to false"
                );
                Evaluation {
                    result: false,
                    reasoning: format!("unknown predicate '{name}', defaulted to false"),
                }
            }
        }
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("predicates", &self.predicate_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(key: &str, value: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("req");
        ctx.set(key, value);
        ctx
    }

    #[test]
    fn unknown_predicate_is_false() {
        let evaluator = ConditionEvaluator::with_builtin_predicates(0.7);
        let ctx = ctx_with(keys::ORCHESTRATION_ENABLED, json!(true));
        assert!(!evaluator.evaluate("nonexistent_flag", &ctx));

        let eval = evaluator.evaluate_with_reasoning("nonexistent_flag", &ctx);
        assert!(!eval.result);
        assert!(eval.reasoning.contains("unknown predicate"));
    }

    #[test]
    fn orchestration_enabled_reads_context_flag() {
        let evaluator = ConditionEvaluator::with_builtin_predicates(0.7);
        assert!(evaluator.evaluate(
            ORCHESTRATION_ENABLED,
            &ctx_with(keys::ORCHESTRATION_ENABLED, json!(true))
        ));
        assert!(!evaluator.evaluate(ORCHESTRATION_ENABLED, &ExecutionContext::new("req")));
    }

    #[test]
    fn complexity_threshold_is_strict() {
        let evaluator = ConditionEvaluator::with_builtin_predicates(0.7);
        assert!(evaluator.evaluate(COMPLEXITY_HIGH, &ctx_with(keys::COMPLEXITY_SCORE, json!(0.71))));
        assert!(!evaluator.evaluate(COMPLEXITY_HIGH, &ctx_with(keys::COMPLEXITY_SCORE, json!(0.7))));
        assert!(!evaluator.evaluate(COMPLEXITY_HIGH, &ExecutionContext::new("req")));
    }

    #[test]
    fn question_and_history_predicates() {
        let evaluator = ConditionEvaluator::with_builtin_predicates(0.7);
        assert!(evaluator.evaluate(
            CONTENT_IS_QUESTION,
            &ctx_with(keys::CONTENT, json!("is it raining? "))
        ));
        assert!(!evaluator.evaluate(HISTORY_PRESENT, &ctx_with(keys::HISTORY, json!([]))));
        assert!(evaluator.evaluate(
            HISTORY_PRESENT,
            &ctx_with(keys::HISTORY, json!([{ "role": "user" }]))
        ));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let evaluator = ConditionEvaluator::with_builtin_predicates(0.7);
        let ctx = ctx_with(keys::COMPLEXITY_SCORE, json!(0.9));
        let first = evaluator.evaluate_with_reasoning(COMPLEXITY_HIGH, &ctx);
        let second = evaluator.evaluate_with_reasoning(COMPLEXITY_HIGH, &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn custom_predicate_replaces_builtin() {
        let evaluator =
            ConditionEvaluator::with_builtin_predicates(0.7).with_predicate(COMPLEXITY_HIGH, |_| true);
        assert!(evaluator.evaluate(COMPLEXITY_HIGH, &ExecutionContext::new("req")));
        assert!(evaluator.has_predicate(HISTORY_PRESENT));
        assert_eq!(evaluator.predicate_names().len(), 4);
    }
}
