use stride_core::{Habit, Tracker};

use crate::cli::HabitCommands;
use crate::commands::common::{
    normalize_title, parse_day_or_today, print_json, resolve_entity, settle_critical_sync,
    short_id, today,
};
use crate::error::CliError;

pub async fn run_habit(command: HabitCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        HabitCommands::Add { title, frequency } => {
            let title = normalize_title(&title)?;
            let habit = tracker.add_habit(&title, frequency.into()).await?;
            println!("{}", habit.id);
        }
        HabitCommands::List { json } => {
            let habits = tracker.habits().await?;
            if json {
                return print_json(&habits);
            }
            if habits.is_empty() {
                println!("No habits.");
            }
            for line in format_habit_lines(&habits) {
                println!("{line}");
            }
        }
        HabitCommands::Check { id, date } => {
            let habit = resolve_entity(&id, tracker.habits().await?, "habit")?;
            let date = parse_day_or_today(date.as_deref())?;
            tracker.check_habit(&habit.id, date).await?;
            println!("{} checked for {date}", habit.id);
        }
        HabitCommands::Delete { id } => {
            let habit = resolve_entity(&id, tracker.habits().await?, "habit")?;
            tracker.delete_habit(&habit.id).await?;
            println!("{}", habit.id);
            settle_critical_sync(tracker).await?;
        }
    }
    Ok(())
}

pub fn format_habit_lines(habits: &[Habit]) -> Vec<String> {
    let today = today();
    habits
        .iter()
        .map(|habit| {
            let mark = if habit.is_checked_on(today) { "x" } else { " " };
            let frequency = serde_json::to_value(habit.frequency)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default();
            format!(
                "[{mark}] {}  {}  {frequency}  {} day(s) checked",
                short_id(&habit.id),
                habit.title,
                habit.completed_dates.len()
            )
        })
        .collect()
}
