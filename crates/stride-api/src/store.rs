//! Per-user record store behind `POST /v1/sync`.
//!
//! Records are kept in memory. A request is applied under one lock, so a
//! batch is never interleaved with another device's batch.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use stride_core::models::{EntityKind, LocalOperation, ReviewState, SyncConflict};
use stride_core::sync::{QueueEntry, SyncRequest, SyncResponse};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
struct Record {
    body: Value,
    version: i64,
    /// Server clock of the last write
    updated_at: i64,
    deleted: bool,
    last_device: String,
}

#[derive(Debug, Default)]
struct UserData {
    records: BTreeMap<(EntityKind, String), Record>,
    review: ReviewState,
    clock: i64,
}

enum Applied {
    Written,
    Ignored,
    Conflict(SyncConflict),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub records: usize,
}

#[derive(Default)]
pub struct SyncStore {
    users: Mutex<HashMap<String, UserData>>,
}

impl SyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a client batch and answer with everything newer than its watermark
    pub async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse, AppError> {
        validate(request)?;
        let now = Utc::now().timestamp_millis();
        let mut users = self.users.lock().await;
        let user = users.entry(request.user_id.clone()).or_default();
        Ok(user.exchange(request, now))
    }

    pub async fn stats(&self) -> StoreStats {
        let users = self.users.lock().await;
        StoreStats {
            users: users.len(),
            records: users.values().map(|user| user.records.len()).sum(),
        }
    }
}

impl UserData {
    fn exchange(&mut self, request: &SyncRequest, now: i64) -> SyncResponse {
        let mut conflicts = Vec::new();
        let mut written = 0_usize;
        for (kind, entries) in &request.changes {
            for entry in entries {
                match self.apply(*kind, entry, &request.device_id, now) {
                    Applied::Written => written += 1,
                    Applied::Ignored => {}
                    Applied::Conflict(conflict) => conflicts.push(conflict),
                }
            }
        }

        if request.review.last_active_date >= self.review.last_active_date {
            self.review = request.review.clone();
        }

        let mut data: BTreeMap<EntityKind, Vec<Value>> = BTreeMap::new();
        let mut deleted: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
        for ((kind, id), record) in &self.records {
            if record.updated_at <= request.last_sync_at {
                continue;
            }
            if record.deleted {
                deleted.entry(*kind).or_default().push(id.clone());
            } else {
                data.entry(*kind).or_default().push(record.body.clone());
            }
        }

        let watermark = next_stamp(&mut self.clock, now);
        info!(
            device = %request.device_id,
            received = request.change_count(),
            written,
            conflicts = conflicts.len(),
            watermark,
            "Applied sync batch"
        );

        SyncResponse {
            success: true,
            conflicts,
            new_last_sync_at: watermark,
            review: Some(self.review.clone()),
            data: Some(data),
            deleted,
            error: None,
        }
    }

    fn apply(&mut self, kind: EntityKind, entry: &QueueEntry, device_id: &str, now: i64) -> Applied {
        let key = (kind, entry.id.clone());
        let deleting = entry.operation == LocalOperation::Delete;

        let Some(existing) = self.records.get(&key) else {
            if deleting {
                debug!(%kind, id = %entry.id, "Ignoring delete of unknown entity");
                return Applied::Ignored;
            }
            let updated_at = next_stamp(&mut self.clock, now);
            self.records.insert(
                key,
                Record {
                    body: with_version(&entry.payload, &entry.id, 1),
                    version: 1,
                    updated_at,
                    deleted: false,
                    last_device: device_id.to_string(),
                },
            );
            return Applied::Written;
        };

        if existing.deleted && deleting {
            return Applied::Ignored;
        }
        // Upserts carry a user decision and may revive a tombstone
        let revives = existing.deleted && entry.operation == LocalOperation::Upsert;
        let base_version = entry
            .payload
            .get("version")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if !revives && existing.version > base_version && existing.last_device != device_id {
            debug!(
                %kind,
                id = %entry.id,
                base_version,
                server_version = existing.version,
                "Conflicting change"
            );
            return Applied::Conflict(conflict_for(kind, entry, existing));
        }

        let version = existing.version + 1;
        let body = if deleting {
            with_version(&existing.body, &entry.id, version)
        } else {
            with_version(&entry.payload, &entry.id, version)
        };
        let updated_at = next_stamp(&mut self.clock, now);
        self.records.insert(
            key,
            Record {
                body,
                version,
                updated_at,
                deleted: deleting,
                last_device: device_id.to_string(),
            },
        );
        Applied::Written
    }
}

/// Strictly increasing server clock, never behind wall time
fn next_stamp(clock: &mut i64, now: i64) -> i64 {
    *clock = now.max(*clock + 1);
    *clock
}

fn with_version(payload: &Value, id: &str, version: i64) -> Value {
    let mut body = payload.clone();
    if let Some(object) = body.as_object_mut() {
        object.insert("id".to_string(), Value::from(id));
        object.insert("version".to_string(), Value::from(version));
    }
    body
}

fn conflict_for(kind: EntityKind, entry: &QueueEntry, existing: &Record) -> SyncConflict {
    let message = if existing.deleted {
        "deleted on another device"
    } else {
        "changed on another device"
    };
    SyncConflict {
        kind,
        id: entry.id.clone(),
        message: message.to_string(),
        local_version: Some(entry.payload.clone()),
        server_version: (!existing.deleted).then(|| existing.body.clone()),
        local_operation: Some(entry.operation),
    }
}

fn validate(request: &SyncRequest) -> Result<(), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::bad_request("userId must not be empty"));
    }
    if request.device_id.trim().is_empty() {
        return Err(AppError::bad_request("deviceId must not be empty"));
    }
    for (kind, entries) in &request.changes {
        for entry in entries {
            if entry.id.trim().is_empty() {
                return Err(AppError::bad_request(format!("{kind} entry without an id")));
            }
            if !entry.payload.is_object() {
                return Err(AppError::bad_request(format!(
                    "{kind} entry {} has a non-object payload",
                    entry.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stride_core::sync::SyncChanges;

    fn entry(id: &str, operation: LocalOperation, payload: Value) -> QueueEntry {
        QueueEntry {
            id: id.to_string(),
            client_updated_at: 1,
            operation,
            payload,
        }
    }

    fn request(device: &str, last_sync_at: i64, goals: Vec<QueueEntry>) -> SyncRequest {
        let mut changes = SyncChanges::new();
        if !goals.is_empty() {
            changes.insert(EntityKind::Goal, goals);
        }
        SyncRequest {
            user_id: "u1".to_string(),
            device_id: device.to_string(),
            last_sync_at,
            changes,
            review: ReviewState::default(),
        }
    }

    fn goals(response: &SyncResponse) -> Vec<Value> {
        response
            .data
            .as_ref()
            .and_then(|data| data.get(&EntityKind::Goal).cloned())
            .unwrap_or_default()
    }

    #[test]
    fn create_is_stored_at_version_one_and_echoed() {
        let mut user = UserData::default();
        let response = user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "Read"}))],
            ),
            100,
        );

        assert!(response.success);
        assert!(response.conflicts.is_empty());
        assert_eq!(
            goals(&response),
            vec![json!({"id": "g1", "title": "Read", "version": 1})]
        );
        assert!(response.new_last_sync_at > 100);
    }

    #[test]
    fn delete_of_unknown_entity_is_ignored() {
        let mut user = UserData::default();
        let response = user.exchange(
            &request("d1", 0, vec![entry("g1", LocalOperation::Delete, json!({}))]),
            100,
        );

        assert!(user.records.is_empty());
        assert!(response.deleted.is_empty());
    }

    #[test]
    fn stale_change_from_another_device_conflicts() {
        let mut user = UserData::default();
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry(
                    "g1",
                    LocalOperation::Update,
                    json!({"title": "B", "version": 1}),
                )],
            ),
            200,
        );

        // d2 last saw version 1
        let response = user.exchange(
            &request(
                "d2",
                0,
                vec![entry(
                    "g1",
                    LocalOperation::Update,
                    json!({"title": "C", "version": 1}),
                )],
            ),
            300,
        );

        assert_eq!(response.conflicts.len(), 1);
        let conflict = &response.conflicts[0];
        assert_eq!(conflict.id, "g1");
        assert_eq!(
            conflict.server_version,
            Some(json!({"id": "g1", "title": "B", "version": 2}))
        );
        assert_eq!(conflict.local_operation, Some(LocalOperation::Update));
        let record = &user.records[&(EntityKind::Goal, "g1".to_string())];
        assert_eq!(record.version, 2);
        assert_eq!(record.body["title"], "B");
    }

    #[test]
    fn same_device_may_write_over_its_own_unseen_versions() {
        let mut user = UserData::default();
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        let response = user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Update, json!({"title": "B"}))],
            ),
            200,
        );

        assert!(response.conflicts.is_empty());
        assert_eq!(
            goals(&response),
            vec![json!({"id": "g1", "title": "B", "version": 2})]
        );
    }

    #[test]
    fn rebased_change_is_applied() {
        let mut user = UserData::default();
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        let response = user.exchange(
            &request(
                "d2",
                0,
                vec![entry(
                    "g1",
                    LocalOperation::Upsert,
                    json!({"title": "Mine", "version": 1}),
                )],
            ),
            200,
        );

        assert!(response.conflicts.is_empty());
        assert_eq!(goals(&response)[0]["version"], 2);
    }

    #[test]
    fn incremental_responses_only_carry_newer_records() {
        let mut user = UserData::default();
        let first = user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        let second = user.exchange(
            &request(
                "d1",
                first.new_last_sync_at,
                vec![entry("g2", LocalOperation::Create, json!({"title": "B"}))],
            ),
            100,
        );

        let ids: Vec<_> = goals(&second)
            .iter()
            .map(|goal| goal["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["g2".to_string()]);
        assert!(second.new_last_sync_at > first.new_last_sync_at);

        let idle = user.exchange(&request("d1", second.new_last_sync_at, Vec::new()), 50);
        assert!(goals(&idle).is_empty());
        assert!(idle.new_last_sync_at > second.new_last_sync_at);
    }

    #[test]
    fn deletes_are_reported_as_deleted_ids() {
        let mut user = UserData::default();
        let first = user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        user.exchange(
            &request(
                "d1",
                first.new_last_sync_at,
                vec![entry("g1", LocalOperation::Delete, json!({"version": 1}))],
            ),
            200,
        );

        let other = user.exchange(&request("d2", first.new_last_sync_at, Vec::new()), 300);
        assert_eq!(
            other.deleted.get(&EntityKind::Goal),
            Some(&vec!["g1".to_string()])
        );
        assert!(goals(&other).is_empty());
    }

    #[test]
    fn update_racing_a_delete_conflicts_without_server_copy() {
        let mut user = UserData::default();
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ),
            100,
        );
        user.exchange(
            &request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Delete, json!({"version": 1}))],
            ),
            200,
        );

        let response = user.exchange(
            &request(
                "d2",
                0,
                vec![entry(
                    "g1",
                    LocalOperation::Update,
                    json!({"title": "B", "version": 1}),
                )],
            ),
            300,
        );
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].server_version, None);
        assert_eq!(response.conflicts[0].message, "deleted on another device");

        // Keeping the local copy revives the entity
        let response = user.exchange(
            &request(
                "d2",
                0,
                vec![entry(
                    "g1",
                    LocalOperation::Upsert,
                    json!({"title": "B", "version": 1}),
                )],
            ),
            400,
        );
        assert!(response.conflicts.is_empty());
        assert_eq!(goals(&response)[0]["title"], "B");
    }

    #[test]
    fn newer_review_is_adopted_and_older_one_is_not() {
        let day = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let mut user = UserData::default();

        let mut newer = request("d1", 0, Vec::new());
        newer.review.mark_pending(day);
        newer.review.touch(DateTime::from_timestamp(200, 0).unwrap());
        let response = user.exchange(&newer, 100);
        assert_eq!(response.review, Some(newer.review.clone()));

        let mut older = request("d2", 0, Vec::new());
        older.review.touch(DateTime::from_timestamp(100, 0).unwrap());
        let response = user.exchange(&older, 100);
        assert_eq!(response.review, Some(newer.review));
    }

    #[test]
    fn validation_rejects_missing_ids_and_bad_payloads() {
        let mut missing_device = request("d1", 0, Vec::new());
        missing_device.device_id = " ".to_string();
        assert!(matches!(
            validate(&missing_device),
            Err(AppError::BadRequest(_))
        ));

        let bad_payload = request(
            "d1",
            0,
            vec![entry("g1", LocalOperation::Create, json!("not an object"))],
        );
        assert!(validate(&bad_payload).is_err());

        let empty_id = request("d1", 0, vec![entry(" ", LocalOperation::Create, json!({}))]);
        assert!(validate(&empty_id).is_err());
    }

    #[tokio::test]
    async fn store_keeps_users_apart() {
        let store = SyncStore::new();
        store
            .exchange(&request(
                "d1",
                0,
                vec![entry("g1", LocalOperation::Create, json!({"title": "A"}))],
            ))
            .await
            .unwrap();

        let mut other_user = request("d9", 0, Vec::new());
        other_user.user_id = "u2".to_string();
        let response = store.exchange(&other_user).await.unwrap();
        assert!(goals(&response).is_empty());

        let stats = store.stats().await;
        assert_eq!(stats.users, 2);
        assert_eq!(stats.records, 1);
    }
}
