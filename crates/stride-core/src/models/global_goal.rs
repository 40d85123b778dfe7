//! Long-running goal model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sync_meta::{impl_sync_entity, EntityKind, SyncMetadata};
use crate::util::{new_id, now_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GlobalGoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Achieved,
    Abandoned,
}

/// A long-term goal that daily goals and milestones roll up into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalGoal {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: GlobalGoalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    pub created_at: i64,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl_sync_entity!(GlobalGoal, EntityKind::GlobalGoal);

impl GlobalGoal {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            created_at: now_ms(),
            ..Self::default()
        }
    }

    pub const fn is_open(&self) -> bool {
        matches!(
            self.status,
            GlobalGoalStatus::NotStarted | GlobalGoalStatus::InProgress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&GlobalGoalStatus::NotStarted).unwrap();
        assert_eq!(json, "\"notStarted\"");
    }

    #[test]
    fn test_is_open() {
        let mut goal = GlobalGoal::new("Learn Rust");
        assert!(goal.is_open());
        goal.status = GlobalGoalStatus::Achieved;
        assert!(!goal.is_open());
    }
}
