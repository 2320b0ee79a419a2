//! SQLite-backed queue store.
//!
//! All statements run on the dedicated `tokio-rusqlite` thread, so callers
//! await results without blocking the runtime. Snapshots are written with a
//! conditional update on the version column, which keeps the compare-and-swap
//! guarantee even when several processes share one database file.

use crate::{Event, OutboxError, OutboxResult, QueueKey, QueueSnapshot, QueueStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Queue store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub async fn open(path: &Path) -> OutboxResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutboxError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening queue database");

        let conn = tokio_rusqlite::Connection::open(&path_str).await?;
        Self::initialize(conn, path_str).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> OutboxResult<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::initialize(conn, ":memory:".to_string()).await
    }

    async fn initialize(conn: tokio_rusqlite::Connection, path: String) -> OutboxResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await?;

        conn.call(|conn| {
            run_migrations(conn)?;
            Ok(())
        })
        .await?;

        debug!(path = %path, "Queue database ready");
        Ok(Self { conn, path })
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Run all pending migrations.
fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS outbox_queues (
                queue_key TEXT PRIMARY KEY,
                events TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS outbox_wakes (
                queue_key TEXT PRIMARY KEY,
                wake_at TEXT NOT NULL
            );
            ",
        )?;
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
            params![1, "outbox_queues"],
        )?;
        debug!(version = 1, "Migration applied");
    }

    Ok(())
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn load(&self, key: &QueueKey) -> OutboxResult<QueueSnapshot> {
        let queue_key = key.as_str().to_string();
        let row: Option<(String, i64)> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT events, version FROM outbox_queues WHERE queue_key = ?1",
                        params![queue_key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        match row {
            Some((events, version)) => Ok(QueueSnapshot {
                events: serde_json::from_str(&events)?,
                version: version as u64,
            }),
            None => Ok(QueueSnapshot::default()),
        }
    }

    async fn save(
        &self,
        key: &QueueKey,
        expected_version: u64,
        events: &[Event],
    ) -> OutboxResult<u64> {
        let queue_key = key.as_str().to_string();
        let encoded = serde_json::to_string(events)?;
        let expected = expected_version as i64;

        let changed = self
            .conn
            .call(move |conn| {
                let changed = if expected == 0 {
                    conn.execute(
                        "INSERT INTO outbox_queues (queue_key, events, version)
                         VALUES (?1, ?2, 1)
                         ON CONFLICT(queue_key) DO NOTHING",
                        params![queue_key, encoded],
                    )?
                } else {
                    conn.execute(
                        "UPDATE outbox_queues
                         SET events = ?2, version = version + 1, updated_at = datetime('now')
                         WHERE queue_key = ?1 AND version = ?3",
                        params![queue_key, encoded, expected],
                    )?
                };
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(OutboxError::VersionConflict {
                queue: key.to_string(),
                expected: expected_version,
            });
        }
        Ok(expected_version + 1)
    }

    async fn load_wake(&self, key: &QueueKey) -> OutboxResult<Option<DateTime<Utc>>> {
        let queue_key = key.as_str().to_string();
        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                let raw = conn
                    .query_row(
                        "SELECT wake_at FROM outbox_wakes WHERE queue_key = ?1",
                        params![queue_key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;

        raw.map(|raw| parse_timestamp(&raw)).transpose()
    }

    async fn save_wake(&self, key: &QueueKey, wake_at: Option<DateTime<Utc>>) -> OutboxResult<()> {
        let queue_key = key.as_str().to_string();
        let wake_at = wake_at.map(|at| at.to_rfc3339());

        self.conn
            .call(move |conn| {
                match wake_at {
                    Some(at) => conn.execute(
                        "INSERT INTO outbox_wakes (queue_key, wake_at) VALUES (?1, ?2)
                         ON CONFLICT(queue_key) DO UPDATE SET wake_at = excluded.wake_at",
                        params![queue_key, at],
                    )?,
                    None => conn.execute(
                        "DELETE FROM outbox_wakes WHERE queue_key = ?1",
                        params![queue_key],
                    )?,
                };
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_queues(&self) -> OutboxResult<Vec<QueueKey>> {
        let raw: Vec<String> = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare_cached("SELECT queue_key FROM outbox_queues ORDER BY queue_key")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await?;

        raw.into_iter().map(QueueKey::new).collect()
    }
}

fn parse_timestamp(raw: &str) -> OutboxResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| OutboxError::Storage(format!("invalid wake timestamp {raw:?}: {e}")))
}
