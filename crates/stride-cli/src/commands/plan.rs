use stride_core::models::GlobalGoalStatus;
use stride_core::{GlobalGoal, Tracker};

use crate::cli::PlanCommands;
use crate::commands::common::{
    normalize_title, parse_day, print_json, resolve_entity, short_id, today,
};
use crate::error::CliError;

pub async fn run_plan(command: PlanCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        PlanCommands::Add {
            title,
            category,
            target_date,
        } => {
            let title = normalize_title(&title)?;
            let target_date = target_date
                .map(|value| parse_day(&value, today()))
                .transpose()?;
            let plan = tracker
                .add_global_goal(&title, category, target_date)
                .await?;
            println!("{}", plan.id);
        }
        PlanCommands::List { json } => {
            let plans = tracker.global_goals().await?;
            if json {
                return print_json(&plans);
            }
            if plans.is_empty() {
                println!("No long-term goals.");
            }
            for line in format_plan_lines(&plans) {
                println!("{line}");
            }
        }
        PlanCommands::Status { id, status } => {
            let plan = find_plan(tracker, &id).await?;
            let plan = tracker
                .update_global_goal_status(&plan.id, status.into())
                .await?;
            println!("{} {}", plan.id, status_label(plan.status));
        }
        PlanCommands::Delete { id } => {
            let plan = find_plan(tracker, &id).await?;
            tracker.delete_global_goal(&plan.id).await?;
            println!("{}", plan.id);
        }
    }
    Ok(())
}

pub async fn find_plan(tracker: &Tracker, query: &str) -> Result<GlobalGoal, CliError> {
    resolve_entity(query, tracker.global_goals().await?, "long-term goal")
}

pub const fn status_label(status: GlobalGoalStatus) -> &'static str {
    match status {
        GlobalGoalStatus::NotStarted => "not started",
        GlobalGoalStatus::InProgress => "in progress",
        GlobalGoalStatus::Achieved => "achieved",
        GlobalGoalStatus::Abandoned => "abandoned",
    }
}

pub fn format_plan_lines(plans: &[GlobalGoal]) -> Vec<String> {
    plans
        .iter()
        .map(|plan| {
            let mut parts = vec![
                short_id(&plan.id),
                plan.title.clone(),
                format!("[{}]", status_label(plan.status)),
            ];
            if let Some(category) = &plan.category {
                parts.push(format!("#{category}"));
            }
            if let Some(target) = plan.target_date {
                parts.push(format!("by {target}"));
            }
            parts.join("  ")
        })
        .collect()
}
