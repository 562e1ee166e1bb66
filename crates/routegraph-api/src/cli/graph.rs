//! `rgraph graph`: print the loaded decision graph.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use routegraph_types::node::{DecisionTreeNode, GraphDefinition, NodeBehavior};

use crate::state::AppState;

pub fn show_graph(state: &AppState, json_output: bool) -> Result<()> {
    let registry = state.orchestrator.registry();

    if json_output {
        let definition = GraphDefinition {
            root: registry.root_id().to_string(),
            data_flow_nodes: registry.data_flow_nodes().cloned().collect(),
            decision_nodes: registry.decision_nodes().cloned().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&definition)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Graph rooted at {} ({})",
        style("⚡").bold(),
        style(registry.root_id()).cyan(),
        if state.custom_graph {
            format!("from {}", state.data_dir.join("graph.toml").display())
        } else {
            "built-in".to_string()
        }
    );
    if registry.has_static_cycle() {
        println!(
            "  {} the decision graph contains a cycle",
            style("warning:").yellow().bold()
        );
    }
    println!();

    let mut decisions = Table::new();
    decisions.load_preset(presets::UTF8_FULL_CONDENSED);
    decisions.set_content_arrangement(ContentArrangement::Dynamic);
    decisions.set_header(vec![
        Cell::new("Decision node").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Does").fg(Color::White),
        Cell::new("Next").fg(Color::White),
    ]);
    for node in registry.decision_nodes() {
        let id = if node.id == registry.root_id() {
            Cell::new(format!("{} (root)", node.id)).fg(Color::Cyan)
        } else {
            Cell::new(&node.id)
        };
        decisions.add_row(vec![
            id,
            Cell::new(node.kind().as_str()),
            Cell::new(describe(node)),
            Cell::new(next_summary(node)),
        ]);
    }
    println!("{decisions}");

    let mut leaves = Table::new();
    leaves.load_preset(presets::UTF8_FULL_CONDENSED);
    leaves.set_content_arrangement(ContentArrangement::Dynamic);
    leaves.set_header(vec![
        Cell::new("Data-flow node").fg(Color::White),
        Cell::new("Inputs").fg(Color::White),
        Cell::new("Outputs").fg(Color::White),
        Cell::new("Latency hint").fg(Color::White),
    ]);
    for node in registry.data_flow_nodes() {
        leaves.add_row(vec![
            Cell::new(&node.id),
            Cell::new(node.inputs.join(", ")),
            Cell::new(node.outputs.join(", ")),
            Cell::new(format!("{} ms", node.metadata.latency_ms)),
        ]);
    }
    println!("{leaves}");
    println!();
    Ok(())
}

fn describe(node: &DecisionTreeNode) -> String {
    match &node.behavior {
        NodeBehavior::Condition { predicate, .. } => format!("if {predicate}"),
        NodeBehavior::Action { action }
        | NodeBehavior::Capability { action }
        | NodeBehavior::Fallback { action } => {
            format!("{} {}", action.action_type.as_str(), action.target)
        }
    }
}

fn next_summary(node: &DecisionTreeNode) -> String {
    match &node.behavior {
        NodeBehavior::Condition {
            true_next,
            false_next,
            ..
        } => format!(
            "true → {}, false → {}",
            true_next.as_deref().unwrap_or("(end)"),
            false_next.as_deref().unwrap_or("(end)")
        ),
        _ if node.children.is_empty() => "(end)".to_string(),
        _ => node.children.join(", "),
    }
}
