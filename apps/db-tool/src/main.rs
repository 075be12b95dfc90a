//! CLI tool replaying tracked session scripts.
//!
//! Runs the steps of a JSON script through a tracked session over an
//! in-memory backend and prints the consolidated change report.

mod script;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracked_session_core::config::DEFAULT_SCHEMA;
use tracked_session_core::SessionConfig;

/// Command-line arguments for the tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a session script and print its change report as JSON
    Replay {
        /// Path to the JSON session script
        script: PathBuf,

        /// Schema used for tables that declare none
        #[arg(long, default_value = DEFAULT_SCHEMA)]
        default_schema: String,

        /// Run the script without change tracking
        #[arg(long)]
        no_track: bool,

        /// Print compact instead of pretty JSON
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Replay {
            script,
            default_schema,
            no_track,
            compact,
        } => {
            let parsed = script::load(&script)
                .with_context(|| format!("Failed to load script {}", script.display()))?;
            let config = SessionConfig {
                track_changes: !no_track,
                default_schema,
            };

            tracing::info!(
                "Replaying {} steps from {}",
                parsed.steps.len(),
                script.display()
            );
            let changes = script::run(&parsed, config)?;

            let output = if compact {
                serde_json::to_string(&changes)?
            } else {
                serde_json::to_string_pretty(&changes)?
            };
            println!("{}", output);
        }
    }

    Ok(())
}
