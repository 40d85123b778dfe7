//! Durable storage for the local change queue

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::sync::QueueEntry;

/// libSQL storage for pending queue entries, one row per (kind, entity id)
pub struct QueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> QueueRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load every pending entry
    pub async fn load_all(&self) -> Result<Vec<(EntityKind, QueueEntry)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT kind, entity_id, operation, client_updated_at, payload
                 FROM sync_queue
                 ORDER BY client_updated_at ASC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(0)?;
            let kind: EntityKind = kind
                .parse()
                .map_err(|_| Error::Database(format!("unknown queue kind '{kind}'")))?;
            let operation: String = row.get(2)?;
            let payload: String = row.get(4)?;
            entries.push((
                kind,
                QueueEntry {
                    id: row.get(1)?,
                    operation: operation.parse()?,
                    client_updated_at: row.get(3)?,
                    payload: serde_json::from_str(&payload)?,
                },
            ));
        }
        Ok(entries)
    }

    /// Write an entry, replacing any previous entry for the same id
    pub async fn upsert(&self, kind: EntityKind, entry: &QueueEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_queue
                 (kind, entity_id, operation, client_updated_at, payload)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    kind.as_str(),
                    entry.id.as_str(),
                    entry.operation.as_str(),
                    entry.client_updated_at,
                    serde_json::to_string(&entry.payload)?
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn remove(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_queue WHERE kind = ? AND entity_id = ?",
                params![kind.as_str(), id],
            )
            .await?;
        Ok(())
    }

    /// Remove an entry only if it still carries the acknowledged timestamp
    pub async fn remove_acknowledged(
        &self,
        kind: EntityKind,
        id: &str,
        client_updated_at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_queue
                 WHERE kind = ? AND entity_id = ? AND client_updated_at = ?",
                params![kind.as_str(), id, client_updated_at],
            )
            .await?;
        Ok(())
    }
}
