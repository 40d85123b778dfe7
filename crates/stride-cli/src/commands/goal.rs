use stride_core::{Goal, Tracker};

use crate::cli::GoalCommands;
use crate::commands::common::{
    normalize_title, parse_day, print_json, resolve_entity, settle_critical_sync, short_id, today,
};
use crate::error::CliError;

pub async fn run_goal(command: GoalCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        GoalCommands::Add { title, date } => {
            let title = normalize_title(&title)?;
            let date = date.map(|value| parse_day(&value, today())).transpose()?;
            let goal = tracker.add_goal(&title, date).await?;
            println!("{}", goal.id);
        }
        GoalCommands::List { date, json } => {
            let goals = match date {
                Some(value) => tracker.goals_on(parse_day(&value, today())?).await?,
                None => tracker.goals().await?,
            };
            if json {
                return print_json(&goals);
            }
            if goals.is_empty() {
                println!("No goals.");
            }
            for line in format_goal_lines(&goals) {
                println!("{line}");
            }
        }
        GoalCommands::Done { id } => {
            let goal = find_goal(tracker, &id).await?;
            tracker.complete_goal(&goal.id).await?;
            println!("{}", goal.id);
        }
        GoalCommands::Reschedule { id, date } => {
            let goal = find_goal(tracker, &id).await?;
            let date = parse_day(&date, today())?;
            let goal = tracker.reschedule_goal(&goal.id, date).await?;
            println!("{} -> {date}", goal.id);
            settle_critical_sync(tracker).await?;
        }
        GoalCommands::Delete { id } => {
            let goal = find_goal(tracker, &id).await?;
            tracker.delete_goal(&goal.id).await?;
            println!("{}", goal.id);
        }
    }
    Ok(())
}

async fn find_goal(tracker: &Tracker, query: &str) -> Result<Goal, CliError> {
    resolve_entity(query, tracker.goals().await?, "goal")
}

pub fn format_goal_lines(goals: &[Goal]) -> Vec<String> {
    goals
        .iter()
        .map(|goal| {
            let mark = if goal.completed { "x" } else { " " };
            let date = goal
                .date
                .map_or_else(|| "unscheduled".to_string(), |date| date.to_string());
            let moved = if goal.reschedule_count > 0 {
                format!("  (moved {}x)", goal.reschedule_count)
            } else {
                String::new()
            };
            format!("[{mark}] {}  {date}  {}{moved}", short_id(&goal.id), goal.title)
        })
        .collect()
}
