mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    genesis_core::config::load_dotenv();
    genesis_core::observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            rules,
            once,
            no_history,
        } => {
            commands::run::cmd_run(commands::run::RunOptions {
                profile,
                rules,
                once,
                no_history,
            })
            .await
        }
        Commands::History { limit, jsonl, json } => {
            commands::history::cmd_history(limit, jsonl, json)
        }
        Commands::Seed { output, force } => commands::seed::cmd_seed(output, force),
    }
}
