use chrono::Utc;
use serde::Serialize;
use stride_core::sync::{spawn_polling, BlockReason, SyncEvent, SyncOutcome, SyncReport};
use stride_core::{SyncState, Tracker};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use crate::commands::common::{format_relative_time, format_sync_timestamp, print_json};
use crate::error::CliError;

pub async fn run_sync(tracker: &Tracker, watch: bool) -> Result<(), CliError> {
    if !tracker.sync().settings().is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    match tracker.sync_now().await? {
        SyncOutcome::Completed(report) => println!("{}", format_report(&report)),
        SyncOutcome::Joined => println!("Sync completed"),
        SyncOutcome::Failed(message) => return Err(CliError::SyncFailed(message)),
        SyncOutcome::TimedOut => {
            return Err(CliError::SyncFailed(
                "another sync is still running".to_string(),
            ))
        }
        SyncOutcome::Blocked(BlockReason::PendingConflicts) => {
            println!("Sync paused: resolve conflicts with `stride conflicts resolve`.");
        }
        SyncOutcome::Blocked(BlockReason::PollingStopped) | SyncOutcome::Offline => {}
    }

    if watch {
        watch_sync(tracker).await?;
    }
    Ok(())
}

/// Poll in the background and print engine events until Ctrl-C
async fn watch_sync(tracker: &Tracker) -> Result<(), CliError> {
    let mut events = tracker.sync().subscribe();
    let poller = spawn_polling(tracker.sync().clone());
    println!("Watching for changes (Ctrl-C to stop)");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", format_event(&event)),
                Err(RecvError::Lagged(skipped)) => info!(skipped, "Sync event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    poller.shutdown().await;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusItem {
    pub configured: bool,
    pub endpoint: Option<String>,
    pub user_id: String,
    pub device_id: String,
    pub state: SyncState,
    pub pending_changes: usize,
    pub pending_conflicts: usize,
    pub last_sync_at: i64,
}

pub async fn sync_status(tracker: &Tracker) -> SyncStatusItem {
    let service = tracker.sync();
    let settings = service.settings();
    SyncStatusItem {
        configured: settings.is_configured(),
        endpoint: settings.endpoint.clone(),
        user_id: settings.user_id.clone(),
        device_id: service.device_id().await,
        state: service.status(),
        pending_changes: service.pending_changes().await,
        pending_conflicts: service.pending_conflicts().await.len(),
        last_sync_at: service.last_sync_at().await,
    }
}

pub async fn run_sync_status(tracker: &Tracker, json: bool) -> Result<(), CliError> {
    let status = sync_status(tracker).await;
    if json {
        return print_json(&status);
    }

    for line in format_status_lines(&status, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(status: &SyncStatusItem, now_ms: i64) -> Vec<String> {
    let endpoint = status.endpoint.as_deref().unwrap_or("not configured (local only)");
    let last_sync = if status.last_sync_at > 0 {
        format!(
            "{} ({})",
            format_sync_timestamp(status.last_sync_at),
            format_relative_time(status.last_sync_at, now_ms)
        )
    } else {
        "never".to_string()
    };
    vec![
        format!("Server:    {endpoint}"),
        format!("User:      {}", status.user_id),
        format!("Device:    {}", status.device_id),
        format!("Pending:   {} change(s)", status.pending_changes),
        format!("Conflicts: {}", status.pending_conflicts),
        format!("Last sync: {last_sync}"),
    ]
}

pub fn format_report(report: &SyncReport) -> String {
    let summary = format!(
        "Sync completed: sent {}, merged {}, deleted {}",
        report.sent, report.merged, report.deleted
    );
    if report.conflicts == 0 {
        return summary;
    }
    format!(
        "{summary}; {} conflict(s), run `stride conflicts list`",
        report.conflicts
    )
}

fn format_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::EntitiesMerged { kind, ids } => format!("merged {} {kind}", ids.len()),
        SyncEvent::EntitiesDeleted { kind, ids } => format!("deleted {} {kind}", ids.len()),
        SyncEvent::ReviewUpdated => "review updated".to_string(),
        SyncEvent::SyncFailed { message } => format!("sync failed: {message}"),
        SyncEvent::ConflictsDetected { count } => {
            format!("{count} conflict(s) detected; polling paused")
        }
        SyncEvent::ConflictsResolved => "conflicts resolved".to_string(),
    }
}
