//! Daily goal model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sync_meta::{impl_sync_entity, EntityKind, SyncMetadata};
use crate::util::{new_id, now_ms};

/// A goal planned for a particular day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Day the goal is planned for; `None` keeps it unscheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub completed: bool,
    /// How many times the goal has been moved to another day
    pub reschedule_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl_sync_entity!(Goal, EntityKind::Goal);

impl Goal {
    /// Create a new, unscheduled goal
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            created_at: now_ms(),
            ..Self::default()
        }
    }

    /// Schedule the goal for a given day
    #[must_use]
    pub const fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Move the goal to another day, counting the move
    pub fn reschedule(&mut self, date: NaiveDate) {
        if self.date != Some(date) {
            self.date = Some(date);
            self.reschedule_count = self.reschedule_count.saturating_add(1);
        }
    }
}
