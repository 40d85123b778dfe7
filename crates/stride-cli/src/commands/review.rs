use stride_core::Tracker;

use crate::cli::ReviewCommands;
use crate::commands::common::{
    parse_day, parse_day_or_today, print_json, settle_critical_sync, today,
};
use crate::error::CliError;

pub async fn run_review(command: ReviewCommands, tracker: &Tracker) -> Result<(), CliError> {
    match command {
        ReviewCommands::Pending { json } => {
            let review = tracker.review().await;
            if json {
                return print_json(&review);
            }
            if review.pending_review_dates.is_empty() {
                println!("No days waiting for a review.");
            }
            for date in &review.pending_review_dates {
                println!("{date}");
            }
        }
        ReviewCommands::Mark { date } => {
            let date = parse_day(&date, today())?;
            tracker.mark_day_pending(date).await?;
            println!("{date} marked for review");
        }
        ReviewCommands::EndDay { date } => {
            let date = parse_day_or_today(date.as_deref())?;
            let review = tracker.end_day(date).await?;
            println!(
                "Closed {date}; {} day(s) still pending",
                review.pending_review_dates.len()
            );
            settle_critical_sync(tracker).await?;
        }
    }
    Ok(())
}
