//! Entity snapshot repository

use libsql::{params, Connection};

use super::{opt_integer, opt_text, value_as_opt_integer};
use crate::error::{Error, Result};
use crate::models::{EntityKind, LocalOperation, SyncEntity};

/// libSQL storage for entity snapshots of every kind
pub struct EntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> EntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace an entity, tombstones included
    pub async fn put<E: SyncEntity>(&self, entity: &E) -> Result<()> {
        if entity.id().trim().is_empty() {
            return Err(Error::InvalidInput("entity id must not be empty".into()));
        }
        let body = serde_json::to_string(entity)?;
        let meta = entity.sync();
        let version = i64::try_from(meta.version)
            .map_err(|_| Error::InvalidInput(format!("version {} out of range", meta.version)))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO entities
                 (kind, id, body, local_updated_at, local_operation, version)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    E::KIND.as_str(),
                    entity.id(),
                    body,
                    opt_integer(meta.local_updated_at),
                    opt_text(meta.local_operation.map(LocalOperation::as_str)),
                    version
                ],
            )
            .await?;
        Ok(())
    }

    /// Get an entity by id, including a pending-delete tombstone
    pub async fn get<E: SyncEntity>(&self, id: &str) -> Result<Option<E>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM entities WHERE kind = ? AND id = ?",
                params![E::KIND.as_str(), id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// List visible entities of a kind, oldest first
    pub async fn list<E: SyncEntity>(&self) -> Result<Vec<E>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM entities
                 WHERE kind = ? AND (local_operation IS NULL OR local_operation != 'delete')
                 ORDER BY id ASC",
                params![E::KIND.as_str()],
            )
            .await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            let body: String = row.get(0)?;
            entities.push(serde_json::from_str(&body)?);
        }
        Ok(entities)
    }

    /// Count visible entities of a kind
    pub async fn count(&self, kind: EntityKind) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM entities
                 WHERE kind = ? AND (local_operation IS NULL OR local_operation != 'delete')",
                params![kind.as_str()],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Physically remove an entity; returns whether a row existed
    pub async fn remove(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM entities WHERE kind = ? AND id = ?",
                params![kind.as_str(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Rewrite the pending operation of a stored entity; returns whether a row changed
    pub async fn set_pending_operation(
        &self,
        kind: EntityKind,
        id: &str,
        operation: LocalOperation,
    ) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM entities WHERE kind = ? AND id = ?",
                params![kind.as_str(), id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(false);
        };
        let body: String = row.get(0)?;
        drop(rows);

        let mut value: serde_json::Value = serde_json::from_str(&body)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "localOperation".to_string(),
                serde_json::Value::String(operation.as_str().to_string()),
            );
        }
        self.conn
            .execute(
                "UPDATE entities SET body = ?, local_operation = ? WHERE kind = ? AND id = ?",
                params![
                    serde_json::to_string(&value)?,
                    operation.as_str(),
                    kind.as_str(),
                    id
                ],
            )
            .await?;
        Ok(true)
    }

    /// Clear the pending operation after the server acknowledged the change.
    ///
    /// Only applies when the entity was not mutated again after `acked_at`.
    pub async fn mark_synced(&self, kind: EntityKind, id: &str, acked_at: i64) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT body, local_updated_at FROM entities WHERE kind = ? AND id = ?",
                params![kind.as_str(), id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(false);
        };
        let body: String = row.get(0)?;
        let local_updated_at = value_as_opt_integer(row.get_value(1)?);
        drop(rows);

        if local_updated_at != Some(acked_at) {
            return Ok(false);
        }

        let mut value: serde_json::Value = serde_json::from_str(&body)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("localOperation");
        }

        self.conn
            .execute(
                "UPDATE entities SET body = ?, local_operation = NULL WHERE kind = ? AND id = ?",
                params![serde_json::to_string(&value)?, kind.as_str(), id],
            )
            .await?;
        Ok(true)
    }
}
