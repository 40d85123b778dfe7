//! Wire types of the sync protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, LocalOperation, ReviewState, SyncConflict};
use crate::util::new_id;

/// A pending local mutation, keyed by entity id within its kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub client_updated_at: i64,
    pub operation: LocalOperation,
    /// Entity with local sync metadata stripped
    pub payload: serde_json::Value,
}

/// Queue contents per kind, as sent in a request
pub type SyncChanges = BTreeMap<EntityKind, Vec<QueueEntry>>;

/// Process-wide sync bookkeeping persisted under `sync-meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Stable per install; never changes once created
    pub device_id: String,
    /// Server watermark; 0 before the first successful round
    pub last_sync_at: i64,
}

impl SyncMeta {
    pub fn new_device() -> Self {
        Self {
            device_id: new_id(),
            last_sync_at: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: String,
    pub device_id: String,
    pub last_sync_at: i64,
    pub changes: SyncChanges,
    pub review: ReviewState,
}

impl SyncRequest {
    /// Number of queue entries carried by the request
    pub fn change_count(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
    #[serde(default)]
    pub new_last_sync_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewState>,
    /// Authoritative snapshots per kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<EntityKind, Vec<serde_json::Value>>>,
    /// Ids deleted on the server since the request watermark
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted: BTreeMap<EntityKind, Vec<String>>,
    /// Explanation accompanying `success: false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    /// Successful response carrying only a new watermark
    pub fn accepted(new_last_sync_at: i64) -> Self {
        Self {
            success: true,
            new_last_sync_at,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
