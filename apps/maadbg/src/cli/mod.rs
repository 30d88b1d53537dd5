//! # maadbg CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the live trace server
//! - `replay` - Fold a recorded notification log into a trace
//! - `inspect` - Print a saved canonical snapshot

mod commands;

use crate::config::DebuggerConfig;
use clap::{Parser, Subcommand};
use maadbg_core::DebuggerError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// maadbg - live pipeline debugger
///
/// Rebuilds the execution trace of a pipeline automation engine from its
/// notification stream.
#[derive(Parser, Debug)]
#[command(name = "maadbg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (default: ./maadbg.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Replay a recorded notification log (JSON array or JSON lines)
    Replay {
        /// Path to the notification log
        #[arg(short, long)]
        file: PathBuf,

        /// Also write the resulting trace as a canonical snapshot
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Also write the resulting trace as JSON
        #[arg(long)]
        json_out: Option<PathBuf>,
    },

    /// Print a canonical snapshot
    Inspect {
        /// Snapshot file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and the resolved config.
pub async fn execute(cli: Cli, mut config: DebuggerConfig) -> Result<(), DebuggerError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            config.apply_cli(host, port);
            cmd_server(&config).await
        }
        Some(Commands::Replay {
            file,
            export,
            json_out,
        }) => cmd_replay(&file, export.as_deref(), json_out.as_deref(), json_mode),
        Some(Commands::Inspect { input }) => cmd_inspect(&input, json_mode),
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}
