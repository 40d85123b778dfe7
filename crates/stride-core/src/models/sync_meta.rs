//! Local-sync metadata shared by every synced entity

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The record types managed by the sync core.
///
/// Serialized as the collection name used on the wire
/// (`goals`, `habits`, `globalGoals`, `milestones`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "goals")]
    Goal,
    #[serde(rename = "habits")]
    Habit,
    #[serde(rename = "globalGoals")]
    GlobalGoal,
    #[serde(rename = "milestones")]
    Milestone,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [Self::Goal, Self::Habit, Self::GlobalGoal, Self::Milestone];

    /// Wire/storage name of the collection
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goals",
            Self::Habit => "habits",
            Self::GlobalGoal => "globalGoals",
            Self::Milestone => "milestones",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "goal" | "goals" => Ok(Self::Goal),
            "habit" | "habits" => Ok(Self::Habit),
            "globalgoal" | "globalgoals" | "plan" | "plans" => Ok(Self::GlobalGoal),
            "milestone" | "milestones" => Ok(Self::Milestone),
            other => Err(Error::InvalidInput(format!("unknown entity kind '{other}'"))),
        }
    }
}

/// Nature of the pending local change on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalOperation {
    Create,
    Update,
    Delete,
    Upsert,
}

impl LocalOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
        }
    }
}

impl FromStr for LocalOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "upsert" => Ok(Self::Upsert),
            other => Err(Error::InvalidInput(format!(
                "unknown local operation '{other}'"
            ))),
        }
    }
}

/// Sync bookkeeping flattened into every entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Timestamp (unix ms) of the last local mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_updated_at: Option<i64>,
    /// Pending local change, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_operation: Option<LocalOperation>,
    /// Server-assigned version; 0 until first synced
    #[serde(default)]
    pub version: u64,
}

impl SyncMetadata {
    /// Whether the entity is a local tombstone awaiting flush
    pub fn is_deleted(&self) -> bool {
        self.local_operation == Some(LocalOperation::Delete)
    }

    /// Record a local mutation
    pub fn touch(&mut self, operation: LocalOperation, now_ms: i64) {
        self.local_updated_at = Some(now_ms);
        self.local_operation = Some(operation);
    }

    /// Drop local-only fields, keeping the version
    pub fn strip_local(&mut self) {
        self.local_updated_at = None;
        self.local_operation = None;
    }
}

/// A record type that participates in sync.
pub trait SyncEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn sync(&self) -> &SyncMetadata;

    fn sync_mut(&mut self) -> &mut SyncMetadata;

    /// Tombstones must never be rendered or counted
    fn is_visible(&self) -> bool {
        !self.sync().is_deleted()
    }

    /// Entity with local metadata stripped, as sent in a queue entry
    fn to_payload(&self) -> Result<serde_json::Value> {
        let mut payload = self.clone();
        payload.sync_mut().strip_local();
        Ok(serde_json::to_value(payload)?)
    }

    /// Decode an entity snapshot, forcing the id when the snapshot omits it
    fn from_snapshot(value: serde_json::Value, id: &str) -> Result<Self> {
        let mut entity: Self = serde_json::from_value(value)?;
        if entity.id().is_empty() {
            entity.set_id(id.to_string());
        }
        Ok(entity)
    }
}

macro_rules! impl_sync_entity {
    ($entity:ty, $kind:expr) => {
        impl $crate::models::SyncEntity for $entity {
            const KIND: $crate::models::EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn sync(&self) -> &$crate::models::SyncMetadata {
                &self.sync
            }

            fn sync_mut(&mut self) -> &mut $crate::models::SyncMetadata {
                &mut self.sync
            }
        }
    };
}

pub(crate) use impl_sync_entity;
