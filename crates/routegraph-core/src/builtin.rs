//! Built-in chat graph and its leaf handlers.
//!
//! The default graph routes a chat message through input analysis and a
//! complexity check:
//!
//! ```text
//! orchestration-enabled ──true──▶ context-analysis ─┬─▶ enrich-context
//!        │                                          └─▶ complexity-check
//!        └─false─▶ legacy-fallback                        │
//!                              true ◀─────────────────────┴──▶ false
//!                     enhanced-processing             standard-processing
//!                              └─▶ enhanced-response
//! ```
//!
//! All handlers are deterministic functions of the context, so the same
//! message always takes the same path.

use std::collections::BTreeMap;
use std::sync::Arc;

use routegraph_types::node::{
    ActionParameter, ActionType, CostMetadata, DataFlowKind, DataFlowNode, DecisionTreeNode,
    GraphDefinition, NodeAction, NodeBehavior, NodeMetadata,
};
use routegraph_types::result::APOLOGY_MESSAGE;
use serde_json::{Value, json};

use crate::condition::{COMPLEXITY_HIGH, ORCHESTRATION_ENABLED};
use crate::context::{ExecutionContext, keys};
use crate::dataflow::{DataFlowRunner, LeafError, LeafOutputs, SyncLeaf};

pub const INPUT_ANALYSIS: &str = "input-analysis";
pub const CONTEXT_ENRICHMENT: &str = "context-enrichment";
pub const RESPONSE_GENERATOR: &str = "response-generator";
pub const FALLBACK_RESPONSE: &str = "fallback-response";

/// Root of the default graph.
pub const DEFAULT_ROOT: &str = "orchestration-enabled";

/// Lower bound of the complexity score.
const COMPLEXITY_FLOOR: f64 = 0.6;
/// Signal strength at which the score reaches the midpoint of its range.
const COMPLEXITY_HALF_SIGNAL: f64 = 24.0;
const QUESTION_SIGNAL: f64 = 6.0;

const GREETINGS: &[&str] = &["hello", "hi", "hey", "greetings", "morning"];

// ---------------------------------------------------------------------------
// Leaf operations
// ---------------------------------------------------------------------------

/// Complexity in `[0.6, 1.0)`, growing with word count and question form.
pub fn complexity_score(content: &str) -> f64 {
    let words = content.split_whitespace().count() as f64;
    let question = if content.trim_end().ends_with('?') {
        QUESTION_SIGNAL
    } else {
        0.0
    };
    let signal = words + question;
    COMPLEXITY_FLOOR + (1.0 - COMPLEXITY_FLOOR) * (signal / (signal + COMPLEXITY_HALF_SIGNAL))
}

/// Coarse intent labels for a message.
pub fn detect_intents(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut intents = Vec::new();

    let first_word = lower
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty());
    if first_word.is_some_and(|w| GREETINGS.contains(&w)) {
        intents.push("greeting".to_string());
    }
    if lower.trim_end().ends_with('?') {
        intents.push("question".to_string());
    }
    if lower.contains("help") {
        intents.push("help_request".to_string());
    }
    if intents.is_empty() {
        intents.push("statement".to_string());
    }
    intents
}

fn input_analysis(_: &DataFlowNode, ctx: &ExecutionContext) -> Result<LeafOutputs, LeafError> {
    let content = ctx.content();
    let text = content.trim();
    let intents = detect_intents(text);

    let mut out = LeafOutputs::new();
    out.insert(
        keys::ANALYZED_MESSAGE.to_string(),
        json!({
            "text": text,
            "wordCount": text.split_whitespace().count(),
            "isQuestion": text.ends_with('?'),
        }),
    );
    out.insert(keys::COMPLEXITY_SCORE.to_string(), json!(complexity_score(text)));
    out.insert(keys::INTENTS.to_string(), json!(intents));
    Ok(out)
}

fn context_enrichment(_: &DataFlowNode, ctx: &ExecutionContext) -> Result<LeafOutputs, LeafError> {
    let history_turns = match ctx.get(keys::HISTORY) {
        Some(Value::Array(turns)) => turns.len(),
        _ => 0,
    };
    let mut out = LeafOutputs::new();
    out.insert(
        "enrichedContext".to_string(),
        json!({
            "historyTurns": history_turns,
            "userId": ctx.get(keys::USER_ID).cloned().unwrap_or(Value::Null),
            "channelId": ctx.get(keys::CHANNEL_ID).cloned().unwrap_or(Value::Null),
        }),
    );
    Ok(out)
}

fn response_generator(_: &DataFlowNode, ctx: &ExecutionContext) -> Result<LeafOutputs, LeafError> {
    let text = ctx
        .get(keys::ANALYZED_MESSAGE)
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_else(|| ctx.content().trim());
    if text.is_empty() {
        return Err(LeafError::Failed("nothing to respond to".to_string()));
    }

    let has_intent = |name: &str| match ctx.get(keys::INTENTS) {
        Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(name)),
        _ => false,
    };
    let mut response = if has_intent("question") {
        format!("Here is what I can tell you about \"{text}\".")
    } else if has_intent("greeting") {
        "Hello! How can I help you today?".to_string()
    } else {
        format!("Understood: {text}")
    };

    let style = ctx
        .get(keys::ACTION_PARAMETERS)
        .and_then(|p| p.get("style"))
        .and_then(Value::as_str);
    if style == Some("detailed") {
        let capabilities: Vec<&str> = ctx
            .get(keys::CAPABILITY_RESULT)
            .and_then(|d| d.get("selected_capabilities"))
            .and_then(Value::as_array)
            .map(|caps| caps.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !capabilities.is_empty() {
            response.push_str(&format!(" (using {})", capabilities.join(", ")));
        }
    }

    let mut out = LeafOutputs::new();
    out.insert(keys::FINAL_RESPONSE.to_string(), Value::String(response));
    Ok(out)
}

fn fallback_response(_: &DataFlowNode, _: &ExecutionContext) -> Result<LeafOutputs, LeafError> {
    let mut out = LeafOutputs::new();
    out.insert(
        keys::FINAL_RESPONSE.to_string(),
        Value::String(APOLOGY_MESSAGE.to_string()),
    );
    Ok(out)
}

/// A runner with every built-in leaf handler registered.
pub fn builtin_runner(validate_inputs: bool) -> DataFlowRunner {
    DataFlowRunner::new(validate_inputs)
        .with_handler(INPUT_ANALYSIS, Arc::new(SyncLeaf(input_analysis)))
        .with_handler(CONTEXT_ENRICHMENT, Arc::new(SyncLeaf(context_enrichment)))
        .with_handler(RESPONSE_GENERATOR, Arc::new(SyncLeaf(response_generator)))
        .with_handler(FALLBACK_RESPONSE, Arc::new(SyncLeaf(fallback_response)))
}

// ---------------------------------------------------------------------------
// Default graph
// ---------------------------------------------------------------------------

fn data_node(
    id: &str,
    kind: DataFlowKind,
    inputs: &[&str],
    outputs: &[&str],
    latency_ms: u64,
) -> DataFlowNode {
    DataFlowNode {
        id: id.to_string(),
        kind,
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        transformations: BTreeMap::new(),
        success_condition: None,
        failure_condition: None,
        timeout_condition: None,
        metadata: CostMetadata {
            latency_ms,
            ..CostMetadata::default()
        },
    }
}

fn decision(
    id: &str,
    behavior: NodeBehavior,
    children: &[&str],
    parent: Option<&str>,
    expected_ms: u64,
) -> DecisionTreeNode {
    DecisionTreeNode {
        id: id.to_string(),
        behavior,
        children: children.iter().map(|s| s.to_string()).collect(),
        parent: parent.map(String::from),
        metadata: NodeMetadata {
            expected_execution_time_ms: expected_ms,
            ..NodeMetadata::default()
        },
    }
}

fn action(action_type: ActionType, target: &str, params: &[(&str, Value)]) -> NodeAction {
    NodeAction {
        action_type,
        target: target.to_string(),
        parameters: params
            .iter()
            .map(|(key, value)| ActionParameter {
                key: key.to_string(),
                value: value.clone(),
            })
            .collect(),
    }
}

/// The built-in chat graph.
pub fn default_graph() -> GraphDefinition {
    let data_flow_nodes = vec![
        data_node(
            INPUT_ANALYSIS,
            DataFlowKind::Processor,
            &[keys::CONTENT],
            &[keys::ANALYZED_MESSAGE, keys::COMPLEXITY_SCORE, keys::INTENTS],
            50,
        ),
        data_node(
            CONTEXT_ENRICHMENT,
            DataFlowKind::Processor,
            &[keys::ANALYZED_MESSAGE, keys::HISTORY],
            &["enrichedContext"],
            30,
        ),
        data_node(
            RESPONSE_GENERATOR,
            DataFlowKind::Output,
            &[keys::ANALYZED_MESSAGE],
            &[keys::FINAL_RESPONSE],
            200,
        ),
        data_node(
            FALLBACK_RESPONSE,
            DataFlowKind::Fallback,
            &[],
            &[keys::FINAL_RESPONSE],
            5,
        ),
    ];

    let decision_nodes = vec![
        decision(
            DEFAULT_ROOT,
            NodeBehavior::Condition {
                predicate: ORCHESTRATION_ENABLED.to_string(),
                true_next: Some("context-analysis".to_string()),
                false_next: Some("legacy-fallback".to_string()),
            },
            &[],
            None,
            0,
        ),
        decision(
            "context-analysis",
            NodeBehavior::Action {
                action: action(ActionType::Activate, INPUT_ANALYSIS, &[]),
            },
            &["enrich-context", "complexity-check"],
            Some(DEFAULT_ROOT),
            100,
        ),
        decision(
            "enrich-context",
            NodeBehavior::Action {
                action: action(ActionType::Activate, CONTEXT_ENRICHMENT, &[]),
            },
            &[],
            Some("context-analysis"),
            100,
        ),
        decision(
            "complexity-check",
            NodeBehavior::Condition {
                predicate: COMPLEXITY_HIGH.to_string(),
                true_next: Some("enhanced-processing".to_string()),
                false_next: Some("standard-processing".to_string()),
            },
            &[],
            Some("context-analysis"),
            0,
        ),
        decision(
            "enhanced-processing",
            NodeBehavior::Capability {
                action: action(
                    ActionType::Configure,
                    "reasoning",
                    &[("quality_mode", json!("enhanced"))],
                ),
            },
            &["enhanced-response"],
            Some("complexity-check"),
            5000,
        ),
        decision(
            "enhanced-response",
            NodeBehavior::Action {
                action: action(
                    ActionType::Activate,
                    RESPONSE_GENERATOR,
                    &[("style", json!("detailed"))],
                ),
            },
            &[],
            Some("enhanced-processing"),
            500,
        ),
        decision(
            "standard-processing",
            NodeBehavior::Action {
                action: action(
                    ActionType::Activate,
                    RESPONSE_GENERATOR,
                    &[("style", json!("concise")), ("quality_mode", json!("standard"))],
                ),
            },
            &[],
            Some("complexity-check"),
            500,
        ),
        decision(
            "legacy-fallback",
            NodeBehavior::Fallback {
                action: action(ActionType::Fallback, FALLBACK_RESPONSE, &[]),
            },
            &[],
            Some(DEFAULT_ROOT),
            50,
        ),
    ];

    GraphDefinition {
        root: DEFAULT_ROOT.to_string(),
        data_flow_nodes,
        decision_nodes,
    }
}
