//! JSON export of local state, and import of another device's export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{GlobalGoal, Goal, Habit, Milestone, ReviewState, SyncEntity};
use crate::sync::merge::{self, MergeWinner};

/// Current export layout
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// A full local replica, as written by `stride export`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub device_id: String,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub global_goals: Vec<GlobalGoal>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub review: ReviewState,
}

/// Counts of replica entities that replaced local ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub goals: usize,
    pub habits: usize,
    pub global_goals: usize,
    pub milestones: usize,
}

impl ImportReport {
    pub const fn total(&self) -> usize {
        self.goals + self.habits + self.global_goals + self.milestones
    }
}

/// Render a replica as pretty-printed JSON.
pub fn render_json_export(document: &ExportDocument) -> serde_json::Result<String> {
    serde_json::to_string_pretty(document)
}

/// Parse a replica, refusing layouts newer than this build understands
pub fn parse_json_export(raw: &str) -> Result<ExportDocument> {
    let document: ExportDocument = serde_json::from_str(raw)?;
    if document.format_version > EXPORT_FORMAT_VERSION {
        return Err(Error::InvalidInput(format!(
            "export format {} is newer than supported format {EXPORT_FORMAT_VERSION}",
            document.format_version
        )));
    }
    Ok(document)
}

/// Whether a replica copy should replace the local one.
///
/// The replica plays the server's side of the merge rule.
pub fn replica_wins<E: SyncEntity>(local: Option<&E>, replica: &E) -> bool {
    merge::choose(local, Some(replica)) == Some(MergeWinner::Server)
}

/// Merge review blocks from two replicas: union of pending days, latest activity
pub fn merge_review(local: &ReviewState, replica: &ReviewState) -> ReviewState {
    let mut merged = local.clone();
    merged
        .pending_review_dates
        .extend(replica.pending_review_dates.iter().copied());
    if let Some(at) = replica.last_active_date {
        merged.touch(at);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocalOperation;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn document() -> ExportDocument {
        let mut goal = Goal::new("Read");
        goal.id = "g1".to_string();
        goal.created_at = 1;
        ExportDocument {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            device_id: "d1".to_string(),
            goals: vec![goal],
            habits: Vec::new(),
            global_goals: Vec::new(),
            milestones: Vec::new(),
            review: ReviewState::default(),
        }
    }

    #[test]
    fn json_export_is_readable_back() {
        let document = document();
        let rendered = render_json_export(&document).unwrap();
        assert!(rendered.contains("\"formatVersion\": 1"));
        assert!(rendered.contains("\"globalGoals\": []"));
        assert_eq!(parse_json_export(&rendered).unwrap(), document);
    }

    #[test]
    fn newer_format_is_rejected() {
        let mut document = document();
        document.format_version = EXPORT_FORMAT_VERSION + 1;
        let rendered = render_json_export(&document).unwrap();
        assert!(matches!(
            parse_json_export(&rendered),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn replica_merge_follows_version_rule() {
        let mut local = Goal::new("local");
        local.sync.version = 2;
        let mut replica = local.clone();
        replica.title = "replica".to_string();

        replica.sync.version = 1;
        assert!(!replica_wins(Some(&local), &replica));

        replica.sync.version = 2;
        local.sync.touch(LocalOperation::Update, 50);
        replica.sync.touch(LocalOperation::Update, 60);
        assert!(replica_wins(Some(&local), &replica));

        assert!(replica_wins(None, &replica));
    }

    #[test]
    fn review_merge_unions_pending_days() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
        let mut local = ReviewState::default();
        local.mark_pending(day(1));
        local.touch(DateTime::from_timestamp(100, 0).unwrap());
        let mut replica = ReviewState::default();
        replica.mark_pending(day(2));
        replica.touch(DateTime::from_timestamp(50, 0).unwrap());

        let merged = merge_review(&local, &replica);
        assert_eq!(merged.pending_review_dates.len(), 2);
        assert_eq!(
            merged.last_active_date,
            DateTime::from_timestamp(100, 0)
        );
    }
}
