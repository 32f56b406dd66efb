//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

pub use job::JobCommands;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use spore_client::SporeClient;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Check that the orchestrator is reachable
    Health,
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, client: &SporeClient) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, client).await,
        Commands::Health => {
            client
                .health()
                .await
                .with_context(|| format!("Orchestrator at {} is not healthy", client.base_url()))?;
            println!("{} {}", "✓".green(), client.base_url());
            Ok(())
        }
    }
}
