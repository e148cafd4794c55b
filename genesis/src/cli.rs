use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Genesis - a self-evolving growth loop for agent profiles
#[derive(Parser, Debug)]
#[command(name = "genesis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the growth loop. Reads JSONL from stdin: interaction records, or commands
    /// such as {"vote":{"proposal_id":"..","approve":true}}, {"apply":{"proposal_id":".."}},
    /// {"reject":{"proposal_id":"..","reason":".."}}, {"rollback":{"index":2}},
    /// {"cycle":{"kind":"rapid"}} and "status".
    Run {
        /// Baseline profile JSON (default: GENESIS_PROFILE, else the bundled seed)
        #[arg(long, value_name = "FILE", env = "GENESIS_PROFILE")]
        profile: Option<PathBuf>,

        /// Extraction rules JSON (default: bundled seed rules)
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,

        /// Skip the scheduler: read all of stdin, run rapid, standard and deep once, exit
        #[arg(long)]
        once: bool,

        /// Do not write the JSONL changelog or the SQLite history
        #[arg(long)]
        no_history: bool,
    },

    /// Show recent evolution history
    History {
        /// Number of records to show
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,

        /// Read the JSONL changelog instead of the SQLite log
        #[arg(long)]
        jsonl: bool,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the bundled seed profile and extraction rules
    Seed {
        /// Profile path (default: <data dir>/profile.json)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_history_flags() {
        let cli = Cli::parse_from(["genesis", "history", "-n", "5", "--jsonl"]);
        match cli.command {
            Commands::History { limit, jsonl, json } => {
                assert_eq!(limit, 5);
                assert!(jsonl);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
