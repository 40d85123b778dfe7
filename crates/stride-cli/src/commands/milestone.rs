use stride_core::{Milestone, Tracker};

use crate::cli::MilestoneCommands;
use crate::commands::common::{normalize_title, print_json, resolve_entity, short_id};
use crate::commands::plan::find_plan;
use crate::error::CliError;

pub async fn run_milestone(command: MilestoneCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        MilestoneCommands::Add { plan, title } => {
            let plan = find_plan(tracker, &plan).await?;
            let title = normalize_title(&title)?;
            let milestone = tracker.add_milestone(&plan.id, &title).await?;
            println!("{}", milestone.id);
        }
        MilestoneCommands::List { plan, json } => {
            let plan = find_plan(tracker, &plan).await?;
            let milestones = tracker.milestones_for(&plan.id).await?;
            if json {
                return print_json(&milestones);
            }
            println!("{}", plan.title);
            if milestones.is_empty() {
                println!("  No milestones.");
            }
            for line in format_milestone_lines(&milestones) {
                println!("  {line}");
            }
        }
        MilestoneCommands::Done { id } => {
            let milestone = resolve_entity(&id, tracker.milestones().await?, "milestone")?;
            tracker.complete_milestone(&milestone.id).await?;
            println!("{}", milestone.id);
        }
        MilestoneCommands::Delete { id } => {
            let milestone = resolve_entity(&id, tracker.milestones().await?, "milestone")?;
            tracker.delete_milestone(&milestone.id).await?;
            println!("{}", milestone.id);
        }
    }
    Ok(())
}

pub fn format_milestone_lines(milestones: &[Milestone]) -> Vec<String> {
    milestones
        .iter()
        .map(|milestone| {
            let mark = if milestone.completed { "x" } else { " " };
            format!(
                "{}. [{mark}] {}  {}",
                milestone.order,
                short_id(&milestone.id),
                milestone.title
            )
        })
        .collect()
}
