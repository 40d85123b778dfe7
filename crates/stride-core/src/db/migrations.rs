//! Schema migrations, applied in order and recorded in `schema_version`

use libsql::Connection;
use tracing::info;

use crate::error::Result;

/// One schema step: the version it produces and the statements that get there
struct Migration {
    version: i64,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        // Entity snapshots; body holds the full JSON including sync metadata
        "CREATE TABLE IF NOT EXISTS entities (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            local_updated_at INTEGER,
            local_operation TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (kind, id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_entities_operation ON entities(kind, local_operation)",
        // One pending entry per entity id per kind
        "CREATE TABLE IF NOT EXISTS sync_queue (
            kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            client_updated_at INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (kind, entity_id)
        )",
        // Device id, watermark, review state, pending conflicts
        "CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ],
}];

/// Bring the schema up to the newest version
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let current = schema_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration).await?;
        info!(version = migration.version, "Applied schema migration");
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction().await?;
    for statement in migration.statements {
        tx.execute(statement, ()).await?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [migration.version],
    )
    .await?;
    tx.commit().await?;
    Ok(())
}
