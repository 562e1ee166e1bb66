//! `rgraph run`: process one message and print the result.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value, json};

use routegraph_core::context::keys;
use routegraph_core::engine::new_correlation_id;
use routegraph_types::result::{OrchestrationResult, ResultSource};
use routegraph_types::trace::TraceRecord;

use super::RunArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: &RunArgs, json_output: bool, quiet: bool) -> Result<()> {
    let correlation_id = args
        .correlation_id
        .clone()
        .unwrap_or_else(new_correlation_id);

    let mut caller = Map::new();
    if let Some(user) = &args.user {
        caller.insert(keys::USER_ID.to_string(), json!(user));
    }
    if let Some(channel) = &args.channel {
        caller.insert(keys::CHANNEL_ID.to_string(), json!(channel));
    }

    let orchestrator = &state.orchestrator;
    let result = orchestrator
        .wire_orchestration(&correlation_id, json!({ "content": args.content }), caller)
        .await?;

    if json_output {
        let mut out = json!({ "result": result });
        if args.show_trace {
            out["traceability"] = serde_json::to_value(orchestrator.get_complete_traceability(&correlation_id))?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if quiet {
        println!("{}", result.response);
        return Ok(());
    }

    print_result(&result);
    if args.show_trace {
        print_trace(&orchestrator.get_traces(&correlation_id));
    }
    Ok(())
}

fn print_result(result: &OrchestrationResult) {
    let source = match result.source {
        ResultSource::Graph => style("graph").green(),
        ResultSource::Legacy => style("legacy").yellow(),
        ResultSource::Apology => style("apology").red(),
    };

    println!();
    println!("  {}", style(&result.response).bold());
    println!();
    println!("  {} {}", style("source:").dim(), source);
    if result.fallback {
        println!("  {} {}", style("fallback:").dim(), style("yes").yellow());
    }
    println!(
        "  {} {}",
        style("correlation id:").dim(),
        style(&result.correlation_id).cyan()
    );

    if let Some(ctx) = &result.context {
        if let Some(score) = ctx.get(keys::COMPLEXITY_SCORE).and_then(Value::as_f64) {
            println!("  {} {score:.3}", style("complexity:").dim());
        }
    }
    println!();
}

fn print_trace(traces: &[TraceRecord]) {
    if traces.is_empty() {
        println!("  {}", style("No trace records (legacy path).").dim());
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Node").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Action").fg(Color::White),
        Cell::new("Latency").fg(Color::White),
        Cell::new("Next").fg(Color::White),
    ]);

    for (i, record) in traces.iter().enumerate() {
        let node = if record.is_error() {
            Cell::new(format!("✗ {}", record.node_id)).fg(Color::Red)
        } else {
            Cell::new(&record.node_id)
        };
        let action = match &record.decision {
            Some(decision) => format!("{} → {}", record.action, decision.result),
            None => record.action.clone(),
        };
        let next = if record.is_error() {
            record.errors.join("; ")
        } else {
            record.next_nodes.join(", ")
        };
        table.add_row(vec![
            Cell::new(i + 1),
            node,
            Cell::new(record.node_kind.as_str()),
            Cell::new(action),
            Cell::new(format!("{} ms", record.performance.latency_ms)),
            Cell::new(next),
        ]);
    }

    println!("{table}");
    println!();
}
