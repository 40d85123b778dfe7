use std::path::Path;

use stride_core::export::{parse_json_export, render_json_export};
use stride_core::Tracker;

use crate::error::CliError;

pub async fn run_export(tracker: &Tracker, output_path: Option<&Path>) -> Result<(), CliError> {
    let document = tracker.export().await?;
    let rendered = render_json_export(&document)?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}

pub async fn run_import(tracker: &Tracker, path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let document = parse_json_export(&raw)?;
    let source = document.device_id.clone();
    let report = tracker.import(document).await?;

    println!(
        "Imported {} item(s) from device {source}: {} goals, {} habits, {} long-term goals, {} milestones",
        report.total(),
        report.goals,
        report.habits,
        report.global_goals,
        report.milestones
    );
    Ok(())
}
