//! Stride CLI - goals, habits and daily reviews from the terminal
//!
//! Works fully offline; when a sync server is configured every change is
//! queued locally and pushed on the next sync.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::common::{open_tracker, resolve_db_path};
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::export::{run_export, run_import};
use crate::commands::goal::run_goal;
use crate::commands::habit::run_habit;
use crate::commands::milestone::run_milestone;
use crate::commands::plan::run_plan;
use crate::commands::review::run_review;
use crate::commands::sync::{run_sync, run_sync_status};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    let command = match cli.command {
        Commands::Config { command } => return run_config(command, profile),
        command => command,
    };

    let db_path = resolve_db_path(cli.db_path.clone());
    let tracker = open_tracker(&db_path, profile).await?;

    match command {
        Commands::Goal { command } => run_goal(command, &tracker).await,
        Commands::Habit { command } => run_habit(command, &tracker).await,
        Commands::Plan { command } => run_plan(command, &tracker).await,
        Commands::Milestone { command } => run_milestone(command, &tracker).await,
        Commands::Review { command } => run_review(command, &tracker).await,
        Commands::Sync {
            command: Some(SyncCommands::Status { json }),
            ..
        } => run_sync_status(&tracker, json).await,
        Commands::Sync {
            command: None,
            watch,
        } => run_sync(&tracker, watch).await,
        Commands::Conflicts { command } => run_conflicts(command, &tracker).await,
        Commands::Export { output } => run_export(&tracker, output.as_deref()).await,
        Commands::Import { path } => run_import(&tracker, &path).await,
        Commands::Config { .. } => Ok(()),
    }
}
