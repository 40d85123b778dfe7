//! Deduplicating queue of local mutations awaiting upload

use std::collections::BTreeMap;

use super::protocol::{QueueEntry, SyncChanges};
use crate::models::{EntityKind, LocalOperation};

/// Effect of enqueueing one mutation, applied to the durable queue as well
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueChange {
    /// The entry for this id is now `QueueEntry`
    Stored(QueueEntry),
    /// A never-uploaded create was deleted; neither side needs to hear about it
    Collapsed,
}

/// In-memory mirror of the pending changes, at most one entry per (kind, id)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeQueue {
    entries: BTreeMap<EntityKind, BTreeMap<String, QueueEntry>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted rows
    pub fn from_entries(entries: impl IntoIterator<Item = (EntityKind, QueueEntry)>) -> Self {
        let mut queue = Self::new();
        for (kind, entry) in entries {
            queue
                .entries
                .entry(kind)
                .or_default()
                .insert(entry.id.clone(), entry);
        }
        queue
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&QueueEntry> {
        self.entries.get(&kind).and_then(|entries| entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp for the next mutation of an id.
    ///
    /// Strictly greater than the pending entry's, so an acknowledgement of an
    /// older upload can never match a newer mutation.
    pub fn next_timestamp(&self, kind: EntityKind, id: &str, now_ms: i64) -> i64 {
        self.get(kind, id)
            .map_or(now_ms, |entry| now_ms.max(entry.client_updated_at + 1))
    }

    /// Decide how a new mutation folds into the pending entry, without applying it.
    ///
    /// A create stays a create until the server has seen it: a later update
    /// only refreshes its payload, and a later delete cancels it outright.
    /// Every other combination is last-operation-wins.
    pub fn plan(
        &self,
        kind: EntityKind,
        operation: LocalOperation,
        id: &str,
        payload: serde_json::Value,
        client_updated_at: i64,
    ) -> QueueChange {
        let pending = self.get(kind, id).map(|entry| entry.operation);
        match (pending, operation) {
            (Some(LocalOperation::Create), LocalOperation::Delete) => QueueChange::Collapsed,
            (
                Some(LocalOperation::Create),
                LocalOperation::Update | LocalOperation::Upsert | LocalOperation::Create,
            ) => QueueChange::Stored(QueueEntry {
                id: id.to_string(),
                client_updated_at,
                operation: LocalOperation::Create,
                payload,
            }),
            _ => QueueChange::Stored(QueueEntry {
                id: id.to_string(),
                client_updated_at,
                operation,
                payload,
            }),
        }
    }

    pub fn apply(&mut self, kind: EntityKind, id: &str, change: &QueueChange) {
        match change {
            QueueChange::Stored(entry) => {
                self.entries
                    .entry(kind)
                    .or_default()
                    .insert(id.to_string(), entry.clone());
            }
            QueueChange::Collapsed => {
                self.remove(kind, id);
            }
        }
    }

    /// Plan and apply in one step
    pub fn enqueue(
        &mut self,
        kind: EntityKind,
        operation: LocalOperation,
        id: &str,
        payload: serde_json::Value,
        client_updated_at: i64,
    ) -> QueueChange {
        let change = self.plan(kind, operation, id, payload, client_updated_at);
        self.apply(kind, id, &change);
        change
    }

    pub fn remove(&mut self, kind: EntityKind, id: &str) -> Option<QueueEntry> {
        let entries = self.entries.get_mut(&kind)?;
        let removed = entries.remove(id);
        if entries.is_empty() {
            self.entries.remove(&kind);
        }
        removed
    }

    /// Current contents keyed by every kind, in upload order
    pub fn snapshot(&self) -> SyncChanges {
        EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let mut entries: Vec<QueueEntry> = self
                    .entries
                    .get(&kind)
                    .map(|entries| entries.values().cloned().collect())
                    .unwrap_or_default();
                entries.sort_by(|a, b| {
                    a.client_updated_at
                        .cmp(&b.client_updated_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
                (kind, entries)
            })
            .collect()
    }

    /// The `limit` oldest entries across all kinds, keyed like [`Self::snapshot`]
    pub fn batch(&self, limit: usize) -> SyncChanges {
        let mut oldest: Vec<(EntityKind, &QueueEntry)> = self
            .entries
            .iter()
            .flat_map(|(kind, entries)| entries.values().map(move |entry| (*kind, entry)))
            .collect();
        oldest.sort_by(|(a_kind, a), (b_kind, b)| {
            a.client_updated_at
                .cmp(&b.client_updated_at)
                .then_with(|| a_kind.cmp(b_kind))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut batch: SyncChanges = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, Vec::new()))
            .collect();
        for (kind, entry) in oldest.into_iter().take(limit) {
            batch.entry(kind).or_default().push(entry.clone());
        }
        batch
    }

    /// Entries of `sent` that are still pending unchanged
    pub fn acknowledged(&self, sent: &SyncChanges) -> Vec<(EntityKind, QueueEntry)> {
        sent.iter()
            .flat_map(|(kind, entries)| entries.iter().map(move |entry| (*kind, entry)))
            .filter(|(kind, entry)| {
                self.get(*kind, &entry.id)
                    .is_some_and(|pending| pending.client_updated_at == entry.client_updated_at)
            })
            .map(|(kind, entry)| (kind, entry.clone()))
            .collect()
    }

    /// Drop the entries a successful round acknowledged
    pub fn acknowledge(&mut self, acked: &[(EntityKind, QueueEntry)]) {
        for (kind, entry) in acked {
            if self
                .get(*kind, &entry.id)
                .is_some_and(|pending| pending.client_updated_at == entry.client_updated_at)
            {
                self.remove(*kind, &entry.id);
            }
        }
    }
}
