//! CLI for querybench
//!
//! Commands:
//! - run: prepare the table, seed it, then benchmark paginated queries
//! - query: benchmark an already seeded table
//! - seed: prepare and seed the table only
//! - clean: delete every item in the table
//! - config: print the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;
mod prompt;

#[derive(Parser)]
#[command(name = "querybench")]
#[command(about = "querybench - measure paginated key-value query throughput", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or reset the table, seed it and run query rounds
    Run(commands::run::RunArgs),

    /// Run query rounds against an existing, seeded table
    Query(commands::query::QueryArgs),

    /// Create or reset the table and seed it
    Seed(commands::seed::SeedArgs),

    /// Delete every item in the table
    Clean(commands::clean::CleanArgs),

    /// Print the effective configuration as TOML
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            init_tracing(args.store.verbose);
            commands::run::run(args).await
        }
        Commands::Query(args) => {
            init_tracing(args.store.verbose);
            commands::query::run(args).await
        }
        Commands::Seed(args) => {
            init_tracing(args.store.verbose);
            commands::seed::run(args).await
        }
        Commands::Clean(args) => {
            init_tracing(args.store.verbose);
            commands::clean::run(args).await
        }
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
