//! Habit model

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::sync_meta::{impl_sync_entity, EntityKind, SyncMetadata};
use crate::util::{new_id, now_ms};

/// How often a habit is expected to be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekdays,
    Weekly,
}

impl HabitFrequency {
    /// Whether the habit is due on the given day
    pub fn is_due_on(self, date: NaiveDate) -> bool {
        match self {
            Self::Daily | Self::Weekly => true,
            Self::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// A recurring habit with its check-in history
///
/// Streak counters are computed by callers and stored as plain fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frequency: HabitFrequency,
    pub completed_dates: BTreeSet<NaiveDate>,
    pub current_streak: u32,
    pub best_streak: u32,
    pub archived: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl_sync_entity!(Habit, EntityKind::Habit);

impl Habit {
    /// Create a new daily habit
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            created_at: now_ms(),
            ..Self::default()
        }
    }

    /// Record a check-in; returns `false` when the day was already checked
    pub fn check(&mut self, date: NaiveDate) -> bool {
        self.completed_dates.insert(date)
    }

    pub fn is_checked_on(&self, date: NaiveDate) -> bool {
        self.completed_dates.contains(&date)
    }
}
