use serde::Serialize;

use crate::models::EntityKind;

/// Notifications published by the sync engine for UI observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Server snapshots replaced local entities
    EntitiesMerged { kind: EntityKind, ids: Vec<String> },
    /// Entities were removed locally after a server delete or an acked tombstone
    EntitiesDeleted { kind: EntityKind, ids: Vec<String> },
    ReviewUpdated,
    /// A round failed; the queue is unchanged
    SyncFailed { message: String },
    ConflictsDetected { count: usize },
    ConflictsResolved,
}
