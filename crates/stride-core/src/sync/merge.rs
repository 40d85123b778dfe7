//! Version-based reconciliation of two copies of the same entity.
//!
//! Used both for server snapshots and for importing another local replica.

use std::collections::BTreeMap;

use crate::models::SyncEntity;

/// Which copy survives a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeWinner {
    Local,
    Server,
}

/// Pick the surviving copy; `None` only when both are absent.
///
/// Higher version wins. On equal versions the later `localUpdatedAt` wins,
/// a missing timestamp counting as 0, and a full tie goes to the server.
pub fn choose<E: SyncEntity>(local: Option<&E>, server: Option<&E>) -> Option<MergeWinner> {
    match (local, server) {
        (None, None) => None,
        (Some(_), None) => Some(MergeWinner::Local),
        (None, Some(_)) => Some(MergeWinner::Server),
        (Some(local), Some(server)) => {
            let (local, server) = (local.sync(), server.sync());
            if server.version != local.version {
                return Some(if server.version > local.version {
                    MergeWinner::Server
                } else {
                    MergeWinner::Local
                });
            }
            let local_at = local.local_updated_at.unwrap_or(0);
            let server_at = server.local_updated_at.unwrap_or(0);
            Some(if local_at > server_at {
                MergeWinner::Local
            } else {
                MergeWinner::Server
            })
        }
    }
}

/// Merge two copies of one entity
pub fn merge_entity<E: SyncEntity>(local: Option<E>, server: Option<E>) -> Option<E> {
    match choose(local.as_ref(), server.as_ref())? {
        MergeWinner::Local => local,
        MergeWinner::Server => server,
    }
}

/// Merge two collections by id, ordered by id
pub fn merge_collections<E: SyncEntity>(local: Vec<E>, server: Vec<E>) -> Vec<E> {
    let mut merged: BTreeMap<String, E> = local
        .into_iter()
        .map(|entity| (entity.id().to_string(), entity))
        .collect();

    for incoming in server {
        let id = incoming.id().to_string();
        let current = merged.remove(&id);
        if let Some(winner) = merge_entity(current, Some(incoming)) {
            merged.insert(id, winner);
        }
    }

    merged.into_values().collect()
}
