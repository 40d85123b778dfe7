use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use stride_core::sync::{BlockReason, SyncOutcome, SyncTrigger};
use stride_core::{SyncConflict, SyncEntity, Tracker};
use tracing::warn;

use crate::config_profiles::{resolve_sync_settings, CliProfilesConfig};
use crate::error::CliError;

pub fn resolve_db_path(db_path: Option<PathBuf>) -> PathBuf {
    db_path
        .or_else(|| std::env::var_os("STRIDE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stride")
        .join("stride.db")
}

/// Open the local store with settings from the environment and the selected profile
pub async fn open_tracker(db_path: &Path, profile: Option<&str>) -> Result<Tracker, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile);
    let settings = resolve_sync_settings(config.profile(&name), |key| std::env::var(key).ok())
        .map_err(CliError::Config)?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Tracker::open_path(db_path, settings).await?)
}

/// Wait for the sync a critical action started, so it is not lost on exit
pub async fn settle_critical_sync(tracker: &Tracker) -> Result<(), CliError> {
    let outcome = tracker.sync().request_sync(SyncTrigger::Critical).await?;
    match outcome {
        SyncOutcome::Failed(message) => {
            warn!("Sync failed, change stays queued: {message}");
            eprintln!("Sync failed; the change is queued and will be retried.");
        }
        SyncOutcome::Blocked(BlockReason::PendingConflicts) => {
            eprintln!("Sync paused: resolve conflicts with `stride conflicts resolve`.");
        }
        SyncOutcome::Completed(report) if report.conflicts > 0 => {
            eprintln!(
                "Sync found {} conflict(s); run `stride conflicts list`.",
                report.conflicts
            );
        }
        _ => {}
    }
    Ok(())
}

pub fn normalize_title(words: &[String]) -> Result<String, CliError> {
    let title = words.join(" ");
    let title = title.trim();
    if title.is_empty() {
        Err(CliError::EmptyTitle)
    } else {
        Ok(title.to_string())
    }
}

/// Parse `YYYY-MM-DD` or a relative day name against `today`
pub fn parse_day(value: &str, today: NaiveDate) -> Result<NaiveDate, CliError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(today + Duration::days(1)),
        "yesterday" => Ok(today - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map_err(|_| CliError::InvalidDate(value.to_string())),
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_day_or_today(value: Option<&str>) -> Result<NaiveDate, CliError> {
    let today = today();
    value.map_or(Ok(today), |value| parse_day(value, today))
}

/// Resolve an exact id or a unique id prefix among visible entities
pub fn resolve_entity<E: SyncEntity>(
    query: &str,
    entities: Vec<E>,
    label: &'static str,
) -> Result<E, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::NotFound(label, query.to_string()));
    }

    let mut matching = entities
        .into_iter()
        .filter(|entity| entity.id().starts_with(query))
        .collect::<Vec<_>>();
    if let Some(position) = matching.iter().position(|entity| entity.id() == query) {
        return Ok(matching.swap_remove(position));
    }

    match matching.len() {
        0 => Err(CliError::NotFound(label, query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|entity| short_id(entity.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn print_json<S: Serialize + ?Sized>(value: &S) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff_secs = (now_ms - timestamp_ms).max(0) / 1000;
    if diff_secs < 60 {
        "just now".to_string()
    } else if diff_secs < 3_600 {
        format!("{}m ago", diff_secs / 60)
    } else if diff_secs < 86_400 {
        format!("{}h ago", diff_secs / 3_600)
    } else {
        format!("{}d ago", diff_secs / 86_400)
    }
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let operation = conflict
                .local_operation
                .map_or("-", |operation| operation.as_str());
            let server = if conflict.server_version.is_some() {
                "server copy"
            } else {
                "no server copy"
            };
            let message = if conflict.message.is_empty() {
                "diverged"
            } else {
                conflict.message.as_str()
            };
            format!(
                "{}:{}  op={operation}  {server}  {message}",
                conflict.kind, conflict.id
            )
        })
        .collect()
}
