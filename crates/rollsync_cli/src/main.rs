//! rollsync CLI
//!
//! Mirrors the learning-platform Export API into a local state directory.
//!
//! # Commands
//!
//! - `sync` - Run sync cycles (once, or continuously until interrupted)
//! - `status` - Display cursors and mirrored record counts
//! - `dump` - Print mirrored records as JSON lines
//! - `compact` - Rewrite mirror journals with one line per record

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rolling-window sync client for the Export API.
#[derive(Parser)]
#[command(name = "rollsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the state directory
    #[arg(global = true, short = 'd', long, env = "ROLLSYNC_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync both collections
    Sync {
        /// Run a single cycle per collection and exit
        #[arg(long)]
        once: bool,

        /// Export API base URL
        #[arg(short, long, env = "ROLLSYNC_BASE_URL")]
        base_url: Option<String>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pre-issued bearer token
        #[arg(long, env = "ROLLSYNC_TOKEN", conflicts_with = "username")]
        token: Option<String>,

        /// Username for the password grant
        #[arg(short, long, env = "ROLLSYNC_USERNAME", requires = "password")]
        username: Option<String>,

        /// Password for the password grant
        #[arg(short, long, env = "ROLLSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Display cursors and mirrored record counts
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print mirrored records of a collection as JSON lines
    Dump {
        /// Collection to dump (resources, activityEvents)
        collection: String,

        /// Include resources marked deleted
        #[arg(long)]
        include_deleted: bool,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rewrite mirror journals with one line per record
    Compact {
        /// Only compact this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Dry run - show what would be done
        #[arg(long)]
        dry_run: bool,
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            once,
            base_url,
            config,
            token,
            username,
            password,
        } => {
            let state_dir = cli.state_dir.ok_or("State directory required for sync")?;
            let args = commands::sync::SyncArgs {
                once,
                base_url,
                config,
                token,
                username,
                password,
            };
            commands::sync::run(&state_dir, args)?;
        }
        Commands::Status { format } => {
            let state_dir = cli.state_dir.ok_or("State directory required for status")?;
            commands::status::run(&state_dir, &format)?;
        }
        Commands::Dump {
            collection,
            include_deleted,
            limit,
        } => {
            let state_dir = cli.state_dir.ok_or("State directory required for dump")?;
            commands::dump::run(&state_dir, &collection, include_deleted, limit)?;
        }
        Commands::Compact {
            collection,
            dry_run,
        } => {
            let state_dir = cli.state_dir.ok_or("State directory required for compact")?;
            commands::compact::run(&state_dir, collection.as_deref(), dry_run)?;
        }
        Commands::Version => {
            println!("rollsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
