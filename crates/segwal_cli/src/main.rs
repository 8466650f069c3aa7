//! SegWAL CLI
//!
//! Command-line tools for inspecting and checking WAL directories.
//!
//! # Commands
//!
//! - `inspect` - List segment files with their sizes and record counts
//! - `verify` - Replay the log read-only and check every checksum
//! - `dump` - Print log entries for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SegWAL command-line tools.
#[derive(Parser)]
#[command(name = "segwal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the WAL directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List segment files and what they contain
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay the log read-only and verify the checksum chain
    Verify,

    /// Dump log entries
    Dump {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this entry index
        #[arg(long, default_value = "0")]
        from: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("WAL path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("WAL path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            limit,
            from,
            format,
        } => {
            let path = cli.path.ok_or("WAL path required for dump")?;
            commands::dump::run(&path, limit, from, &format)?;
        }
        Commands::Version => {
            println!("SegWAL CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
