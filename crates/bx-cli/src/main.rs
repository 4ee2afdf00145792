//! Batch executor CLI.
//!
//! Wires the orchestrator, SQLite store, worktree pool, agent driver, and
//! (optionally) a GitHub forge client into a local `start`/`status`/`tasks`
//! command surface. There is no HTTP control surface here — see SPEC_FULL.md
//! §6 for why.

use clap::{Parser, Subcommand};

mod commands;

/// Batch executor - parallel plan-driven task execution
#[derive(Parser)]
#[command(name = "bx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a plan document and run it to completion
    Start(commands::start::StartArgs),

    /// Show a session's status projection
    Status(commands::status::StatusArgs),

    /// List a session's batches and tasks
    Tasks(commands::tasks::TasksArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start(args) => commands::start::execute(args, cli.json).await,
        Commands::Status(args) => commands::status::execute(args, cli.json).await,
        Commands::Tasks(args) => commands::tasks::execute(args, cli.json).await,
    }
}
