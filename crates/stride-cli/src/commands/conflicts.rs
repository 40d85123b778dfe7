use stride_core::models::{EntityKind, Resolution};
use stride_core::sync::{ConflictResolver, SyncOutcome};
use stride_core::Tracker;

use crate::cli::{ConflictCommands, ResolutionArg};
use crate::commands::common::{format_conflict_lines, print_json};
use crate::commands::sync::format_report;
use crate::error::CliError;

pub async fn run_conflicts(command: ConflictCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { json } => {
            let conflicts = tracker.pending_conflicts().await;
            if json {
                return print_json(&conflicts);
            }
            if conflicts.is_empty() {
                println!("No pending conflicts.");
            }
            for line in format_conflict_lines(&conflicts) {
                println!("{line}");
            }
        }
        ConflictCommands::Resolve { choices, all } => {
            let conflicts = tracker.pending_conflicts().await;
            if conflicts.is_empty() {
                println!("No pending conflicts.");
                return Ok(());
            }
            let resolver = build_resolver(ConflictResolver::new(conflicts), &choices, all)?;
            match tracker.resolve_conflicts(resolver).await? {
                SyncOutcome::Completed(report) => println!("{}", format_report(&report)),
                SyncOutcome::Failed(message) => {
                    println!("Conflicts resolved; sync failed and will be retried: {message}");
                }
                _ => println!("Conflicts resolved"),
            }
        }
    }
    Ok(())
}

/// Apply `--all` and per-conflict choices; every conflict must end up decided
pub fn build_resolver(
    mut resolver: ConflictResolver,
    choices: &[String],
    all: Option<ResolutionArg>,
) -> Result<ConflictResolver, CliError> {
    if let Some(side) = all {
        resolver.choose_all(side.into());
    }
    for raw in choices {
        let (kind, id, resolution) = parse_choice(raw)?;
        resolver.choose(kind, &id, resolution)?;
    }

    if !resolver.is_complete() {
        let missing = resolver
            .unresolved()
            .map(|conflict| format!("{}:{}", conflict.kind, conflict.id))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CliError::InvalidChoice(format!(
            "no choice given for {missing}"
        )));
    }
    Ok(resolver)
}

/// Parse `kind:id=local|server`
pub fn parse_choice(raw: &str) -> Result<(EntityKind, String, Resolution), CliError> {
    let invalid = || CliError::InvalidChoice(raw.to_string());
    let (key, side) = raw.split_once('=').ok_or_else(invalid)?;
    let (kind, id) = key.split_once(':').ok_or_else(invalid)?;
    let id = id.trim();
    if id.is_empty() {
        return Err(invalid());
    }
    let kind = kind.parse::<EntityKind>().map_err(|_| invalid())?;
    let resolution = side.parse::<Resolution>().map_err(|_| invalid())?;
    Ok((kind, id.to_string(), resolution))
}
