//! Milestone model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sync_meta::{impl_sync_entity, EntityKind, SyncMetadata};
use crate::util::{new_id, now_ms};

/// A checkpoint on the way to a global goal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub global_goal_id: String,
    pub title: String,
    pub completed: bool,
    /// Position within the parent global goal
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    pub created_at: i64,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl_sync_entity!(Milestone, EntityKind::Milestone);

impl Milestone {
    #[must_use]
    pub fn new(global_goal_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            global_goal_id: global_goal_id.into(),
            title: title.into(),
            created_at: now_ms(),
            ..Self::default()
        }
    }
}
