//! notebridge CLI
//!
//! Command-line tools for notebridge sync state files.
//!
//! # Commands
//!
//! - `inspect` - Display mapping counts and last pass metadata
//! - `verify` - Check the mapping table for integrity problems
//! - `repair` - Resolve duplicate remote ids and rebuild the index
//! - `migrate` - Rewrite a legacy state file in the current format
//! - `unlink` - Remove one mapping entry

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// notebridge sync state tools.
#[derive(Parser)]
#[command(name = "notebridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync state file
    #[arg(global = true, short, long)]
    state: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mapping counts and last pass metadata
    Inspect {
        /// List every mapping entry
        #[arg(short, long)]
        entries: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check the mapping table for integrity problems
    Verify,

    /// Resolve duplicate remote ids and rebuild the reverse index
    Repair {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Rewrite a legacy state file in the current format
    Migrate {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove the mapping entry for one local note
    Unlink {
        /// Local note id
        local_id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { entries, format } => {
            let path = cli.state.ok_or("State file path required for inspect")?;
            commands::inspect::run(&path, entries, &format)?;
        }
        Commands::Verify => {
            let path = cli.state.ok_or("State file path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Repair { dry_run } => {
            let path = cli.state.ok_or("State file path required for repair")?;
            commands::repair::run(&path, dry_run)?;
        }
        Commands::Migrate { dry_run } => {
            let path = cli.state.ok_or("State file path required for migrate")?;
            commands::migrate::run(&path, dry_run)?;
        }
        Commands::Unlink { local_id } => {
            let path = cli.state.ok_or("State file path required for unlink")?;
            commands::unlink::run(&path, &local_id)?;
        }
        Commands::Version => {
            println!("notebridge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("State format v{}", notebridge_model::STATE_VERSION);
        }
    }

    Ok(())
}
