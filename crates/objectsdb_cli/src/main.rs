//! ObjectsDB CLI
//!
//! Command-line tools for ObjectsDB stores.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and per-kind object counts
//! - `verify` - Verify record log integrity
//! - `compact` - Drop superseded and deleted objects from the record log
//! - `version` - Show version information
//!
//! `inspect` and `verify` read the record log directly and never modify it.
//! `compact` takes the store lock, so it fails while a session is open.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ObjectsDB command-line store tools.
#[derive(Parser)]
#[command(name = "objectsdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// Display store statistics
    Inspect {
        /// Show object counts per kind
        #[arg(short, long)]
        kinds: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify every record checksum in the log
    Verify,

    /// Rewrite the log with only the live objects
    Compact {
        /// Report what would be reclaimed without rewriting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { kinds, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, kinds, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("ObjectsDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ObjectsDB Core v{}", objectsdb_core::VERSION);
        }
    }

    Ok(())
}
