//! # maadbg - Live Pipeline Debugger
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   apps/maadbg (THE BINARY)                   │
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌────────────────┐   │
//! │  │   CLI       │    │   HTTP API  │    │  Ingest loop   │   │
//! │  │  (clap)     │    │   (axum)    │───►│  (tokio mpsc)  │   │
//! │  └──────┬──────┘    └──────┬──────┘    └───────┬────────┘   │
//! │         │                  │                   │            │
//! │         └──────────────────┼───────────────────┘            │
//! │                            ▼                                │
//! │                    ┌───────────────┐                        │
//! │                    │  maadbg-core  │                        │
//! │                    │ (THE LOGIC)   │                        │
//! │                    └───────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the live trace server
//! maadbg server --host 0.0.0.0 --port 8080
//!
//! # Offline
//! maadbg replay -f run.jsonl --export run.mdbg
//! maadbg inspect -i run.mdbg
//! ```

use clap::Parser;
use maadbg::{
    cli,
    config::{DebuggerConfig, LogFormat},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match DebuggerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format, cli.verbose);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the defaults.
fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "maadbg=debug,maadbg_core=debug,tower_http=debug"
    } else {
        "maadbg=info,maadbg_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  maadbg v{}
  live pipeline debugger
"#,
        env!("CARGO_PKG_VERSION")
    );
}
