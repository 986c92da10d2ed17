//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// cueload - Load packages and modules of .cue configuration trees
#[derive(Parser, Debug)]
#[command(name = "cueload")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the packages matched by the given patterns
    List(commands::list::ListArgs),

    /// Print the module build list selected for the main module
    Mods(commands::mods::ModsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::new()
            .parse_filters(&self.log_level)
            .format_timestamp(None)
            .init();

        match self.command {
            Commands::List(args) => commands::list::execute(args),
            Commands::Mods(args) => commands::mods::execute(args),
        }
    }
}
