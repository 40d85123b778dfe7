//! Key/value storage for sync metadata

use libsql::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// `{ deviceId, lastSyncAt }`
pub const SYNC_META_KEY: &str = "sync-meta";
/// Server-authoritative review block
pub const REVIEW_KEY: &str = "review";
/// Conflicts awaiting user resolution
pub const CONFLICTS_KEY: &str = "conflicts";

/// libSQL storage for JSON-encoded sync records
pub struct MetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> MetaRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", params![key])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let value: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                params![key, serde_json::to_string(value)?],
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_meta WHERE key = ?", params![key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ReviewState;
    use chrono::NaiveDate;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_key_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = MetaRepository::new(db.connection());
        let value: Option<ReviewState> = repo.get(REVIEW_KEY).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_get_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = MetaRepository::new(db.connection());

        let mut review = ReviewState::default();
        review.mark_pending(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
        repo.set(REVIEW_KEY, &review).await.unwrap();

        let loaded: ReviewState = repo.get(REVIEW_KEY).await.unwrap().unwrap();
        assert_eq!(loaded, review);

        repo.delete(REVIEW_KEY).await.unwrap();
        assert!(repo.get::<ReviewState>(REVIEW_KEY).await.unwrap().is_none());
    }
}
