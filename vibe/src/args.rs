use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Vibe request router
#[derive(Debug, Parser)]
#[command(name = "vibe", about = "Token-aware routing of normalized requests to specialist handlers")]
pub struct Args {
    /// Path to configuration file; `vibe.toml` is used when present
    #[arg(short, long, env = "VIBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directive, overriding the configured one
    #[arg(long, env = "VIBE_LOG")]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Route JSON-lines requests and record outcomes
    Route {
        /// Read lines from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Restore the optimization cache from and persist it to this file
        #[arg(long, env = "VIBE_CACHE_FILE")]
        cache_file: Option<PathBuf>,
    },
    /// List the active pattern library
    Patterns,
}
