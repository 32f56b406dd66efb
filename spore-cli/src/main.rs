//! Spore CLI
//!
//! Command-line interface for submitting and following jobs on a Spore
//! orchestrator.

mod commands;
mod id_resolver;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use spore_client::SporeClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spore")]
#[command(about = "Run and follow bioinformatics tool jobs", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(long, env = "SPORE_URL", default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = SporeClient::new(cli.url);

    handle_command(cli.command, &client).await
}
