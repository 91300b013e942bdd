//! sessiontier operator CLI entry point.
//!
//! Binary name: `stier`
//!
//! Parses CLI arguments, wires the session stack from `config.toml`, then
//! dispatches to the command handler. Queued writes are flushed before exit.

mod cli;
mod state;

use anyhow::anyhow;
use clap::Parser;
use clap_complete::generate;
use sessiontier_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut tracing_options = TracingOptions::for_verbosity(cli.verbose, cli.quiet);
    tracing_options.json = cli.json;
    tracing_options.otel = cli.otel;
    init_tracing(&tracing_options).map_err(|e| anyhow!(e))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "stier", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    let result = match &cli.command {
        Commands::Get { subject } => cli::session::get(&state, subject, cli.json).await,
        Commands::Set { subject, state: raw, merge } => {
            cli::session::set(&state, subject, raw, *merge, cli.json).await
        }
        Commands::Reset { subject } => cli::session::reset(&state, subject, cli.json).await,
        Commands::Transition { subject, event } => {
            cli::session::transition(&state, subject, event, cli.json).await
        }
        Commands::Peek { subject } => cli::session::peek(&state, subject, cli.json).await,
        Commands::List { limit } => cli::session::list(&state, *limit, cli.json).await,
        Commands::Config => cli::config::show(&state, cli.json),
        Commands::Completions { .. } => Ok(()),
    };

    let report = state.shutdown().await;
    shutdown_tracing();

    result?;
    if report.failed > 0 {
        return Err(anyhow!("{} write(s) could not be persisted", report.failed));
    }
    Ok(())
}
