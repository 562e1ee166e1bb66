//! routegraph command-line entry point.
//!
//! Binary name: `rgraph`

mod cli;
mod state;

use std::path::PathBuf;

use clap::Parser;
use clap_complete::generate;
use routegraph_infra::filesystem::resolve_data_dir;
use routegraph_observe::tracing_setup::{
    LogFormat, TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        enable_otel: cli.otel,
    };
    if let Err(err) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {err}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "rgraph", &mut std::io::stdout());
        return Ok(());
    }

    let result = dispatch(&cli, resolve_data_dir()).await;
    finish(result)
}

async fn dispatch(cli: &Cli, data_dir: PathBuf) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let state = AppState::init(data_dir, |config| args.apply(config)).await?;
            cli::run::run(&state, args, cli.json, cli.quiet).await
        }
        Commands::Graph => {
            let state = AppState::init(data_dir, |_| {}).await?;
            cli::graph::show_graph(&state, cli.json)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Flush buffered spans on success and failure alike.
fn finish(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(err) = &result {
        tracing::debug!(error = %err, "command failed");
    }
    shutdown_tracing();
    result
}
