//! Entistore CLI
//!
//! Command-line tools for entistore identifiers and snapshots.
//!
//! # Commands
//!
//! - `uid next` - Generate identifiers
//! - `uid decode` - Decode identifiers into instant and sequence
//! - `inspect` - Display snapshot statistics
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Entistore command-line tools.
#[derive(Parser)]
#[command(name = "entistore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or decode 12-byte identifiers
    Uid {
        #[command(subcommand)]
        command: UidCommands,
    },

    /// Display snapshot statistics
    Inspect {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// List the identities held by each view
        #[arg(short, long)]
        identities: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum UidCommands {
    /// Generate identifiers
    Next {
        /// Number of identifiers to generate
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Instant in milliseconds since the Unix epoch (default: now)
        #[arg(short, long, allow_negative_numbers = true)]
        at: Option<i64>,

        /// Print uppercase hex
        #[arg(short, long)]
        upper: bool,
    },

    /// Decode identifiers
    Decode {
        /// Identifiers in hex, either case
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
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
        Commands::Uid { command } => match command {
            UidCommands::Next { count, at, upper } => {
                commands::uid::run_next(count, at, upper)?;
            }
            UidCommands::Decode {
                identifiers,
                format,
            } => {
                commands::uid::run_decode(&identifiers, &format)?;
            }
        },
        Commands::Inspect {
            snapshot,
            identities,
            format,
        } => {
            commands::inspect::run(&snapshot, identities, &format)?;
        }
        Commands::Version => {
            println!("Entistore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Entistore Core v{}", entistore_core::VERSION);
        }
    }

    Ok(())
}
