//! Subcommand implementations.

pub mod history;
pub mod run;
pub mod seed;
