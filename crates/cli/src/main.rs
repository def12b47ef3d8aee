// Chargeside CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Logs go to stderr so stdout carries only command output.

mod commands;
mod notifier;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chargeside")]
#[command(about = "Chargeside CLI - Replay driver session traces and inspect session state")]
#[command(version)]
pub struct Cli {
    /// Directory holding the session snapshot
    #[arg(long, env = "CHARGESIDE_STATE_DIR", default_value = ".chargeside")]
    pub state_dir: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Feed a JSONL trace of session commands through the state machine
    Replay {
        /// Trace file, one JSON command per line
        trace: PathBuf,

        /// API base URL for event delivery
        #[arg(long, env = "CHARGESIDE_API_URL")]
        api_url: Option<String>,

        /// Bearer token for event delivery
        #[arg(long, env = "CHARGESIDE_API_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Accept every event locally instead of calling the API
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or remove the persisted session snapshot
    Snapshot {
        #[command(subcommand)]
        command: commands::snapshot::SnapshotCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chargeside=info,chargeside_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Replay {
            trace,
            api_url,
            token,
            dry_run,
        } => {
            let options = commands::replay::ReplayOptions {
                trace,
                state_dir: cli.state_dir,
                api_url,
                token,
                dry_run,
            };
            commands::replay::run(options, output_format, cli.quiet).await
        }
        Commands::Snapshot { command } => {
            commands::snapshot::run(command, &cli.state_dir, output_format).await
        }
    }
}
