//! CLI command definitions for the `rgraph` binary.

pub mod graph;
pub mod run;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use routegraph_types::config::{FallbackStrategy, OrchestrationConfig, TraceabilityMode};

/// Route messages through a decision graph and inspect how they were handled.
#[derive(Parser)]
#[command(name = "rgraph", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, env = "RGRAPH_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one message through the engine.
    Run(RunArgs),

    /// Show the loaded decision graph.
    Graph,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Message content.
    pub content: String,

    /// Correlation id (generated when omitted).
    #[arg(long)]
    pub correlation_id: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub channel: Option<String>,

    /// Print the per-node trace after the response.
    #[arg(long)]
    pub show_trace: bool,

    /// Override the configured fallback strategy.
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Override the configured traceability mode.
    #[arg(long, value_enum)]
    pub trace_mode: Option<TraceModeArg>,

    /// Bypass the graph and use the legacy path.
    #[arg(long)]
    pub disable: bool,
}

impl RunArgs {
    /// Apply command-line overrides to the loaded configuration.
    pub fn apply(&self, config: &mut OrchestrationConfig) {
        if let Some(strategy) = self.strategy {
            config.fallback_strategy = strategy.into();
        }
        if let Some(mode) = self.trace_mode {
            config.traceability_mode = mode.into();
        }
        if self.disable {
            config.enabled = false;
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Graceful,
    Strict,
    Hybrid,
}

impl From<StrategyArg> for FallbackStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Graceful => FallbackStrategy::Graceful,
            StrategyArg::Strict => FallbackStrategy::Strict,
            StrategyArg::Hybrid => FallbackStrategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TraceModeArg {
    Full,
    Essential,
    Minimal,
}

impl From<TraceModeArg> for TraceabilityMode {
    fn from(arg: TraceModeArg) -> Self {
        match arg {
            TraceModeArg::Full => TraceabilityMode::Full,
            TraceModeArg::Essential => TraceabilityMode::Essential,
            TraceModeArg::Minimal => TraceabilityMode::Minimal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "rgraph",
            "run",
            "hello",
            "--strategy",
            "strict",
            "--trace-mode",
            "minimal",
            "--show-trace",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.content, "hello");
        assert!(args.show_trace);

        let mut config = OrchestrationConfig::default();
        args.apply(&mut config);
        assert_eq!(config.fallback_strategy, FallbackStrategy::Strict);
        assert_eq!(config.traceability_mode, TraceabilityMode::Minimal);
        assert!(config.enabled);
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["rgraph", "graph", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Graph));
    }
}
