//! End-of-day review state carried alongside the sync queue

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which days still need an end-of-day review, plus the latest activity time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    #[serde(default)]
    pub pending_review_dates: BTreeSet<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<DateTime<Utc>>,
}

impl ReviewState {
    pub fn mark_pending(&mut self, date: NaiveDate) -> bool {
        self.pending_review_dates.insert(date)
    }

    /// Close the review for a day; returns `false` if it was not pending
    pub fn complete(&mut self, date: NaiveDate) -> bool {
        self.pending_review_dates.remove(&date)
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if self.last_active_date.is_none_or(|previous| previous < at) {
            self.last_active_date = Some(at);
        }
    }
}
