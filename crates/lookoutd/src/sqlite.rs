//! SQLite-backed [`DetectionStore`] via `tokio-rusqlite`.
//!
//! All statements run on the connection's dedicated thread, so the async
//! callers never block the runtime on disk I/O.

use crate::store::{
    new_record_id, DetectionRecord, DetectionStore, DetectionUpdate, NewDetection, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    image_ref    TEXT NOT NULL,
    category     TEXT,
    timestamp    TEXT NOT NULL,
    assigned_to  TEXT,
    is_processed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_detections_user_ts ON detections (user_id, timestamp DESC);
";

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, image_ref, category, timestamp, assigned_to, is_processed FROM detections";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "detection store opened");
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|c| {
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

// Fixed-width UTC timestamps sort lexicographically in time order.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DetectionRecord> {
    let ts: String = row.get(4)?;
    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(DetectionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        image_ref: row.get(2)?,
        category: row.get(3)?,
        timestamp,
        assigned_to: row.get(5)?,
        is_processed: row.get(6)?,
    })
}

#[async_trait]
impl DetectionStore for SqliteStore {
    async fn create_record(&self, new: NewDetection) -> Result<DetectionRecord, StoreError> {
        let record = DetectionRecord {
            id: new_record_id(),
            user_id: new.user_id,
            image_ref: new.image_ref,
            category: new.category,
            timestamp: new.timestamp,
            assigned_to: None,
            is_processed: false,
        };

        let row = record.clone();
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO detections (id, user_id, image_ref, category, timestamp, assigned_to, is_processed)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0)",
                    params![
                        row.id,
                        row.user_id,
                        row.image_ref,
                        row.category,
                        encode_ts(&row.timestamp)
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(id = %record.id, user = %record.user_id, "detection record created");
        Ok(record)
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = self
            .conn
            .call(move |c| {
                let mut stmt = c.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![user_id, limit], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(records)
    }

    async fn update_by_id(
        &self,
        id: &str,
        update: DetectionUpdate,
    ) -> Result<Option<DetectionRecord>, StoreError> {
        let id = id.to_string();
        let record = self
            .conn
            .call(move |c| {
                let changed = c.execute(
                    "UPDATE detections SET assigned_to = ?1, category = ?2, is_processed = ?3 WHERE id = ?4",
                    params![update.assigned_to, update.category, update.is_processed, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let record = c
                    .query_row(
                        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                        params![id],
                        row_to_record,
                    )
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    async fn mark_processed(&self, id: &str) -> Result<Option<DetectionRecord>, StoreError> {
        let id = id.to_string();
        let record = self
            .conn
            .call(move |c| {
                let changed = c.execute(
                    "UPDATE detections SET is_processed = 1 WHERE id = ?1",
                    params![id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let record = c
                    .query_row(
                        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                        params![id],
                        row_to_record,
                    )
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let deleted = self
            .conn
            .call(move |c| {
                let n = c.execute("DELETE FROM detections WHERE id = ?1", params![id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn new_detection(user: &str, ts: DateTime<Utc>) -> NewDetection {
        NewDetection {
            user_id: user.into(),
            image_ref: format!("https://img.example/{user}.jpg"),
            category: Some("delivery".into()),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_newest_first() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let t0 = Utc::now();
        let older = store.create_record(new_detection("alice", t0)).await.unwrap();
        let newer = store
            .create_record(new_detection("alice", t0 + TimeDelta::seconds(30)))
            .await
            .unwrap();
        store.create_record(new_detection("bob", t0)).await.unwrap();

        let list = store.list_by_user("alice", 100).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.id);
        assert_eq!(list[1].id, older.id);
        assert_eq!(list[1].category.as_deref(), Some("delivery"));
        assert!(!list[0].is_processed);
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .create_record(new_detection("alice", t0 + TimeDelta::seconds(i)))
                .await
                .unwrap();
        }
        assert_eq!(store.list_by_user("alice", 3).await.unwrap().len(), 3);
        assert!(store.list_by_user("nobody", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_survives_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ts = DateTime::parse_from_rfc3339("2026-03-04T05:06:07.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let created = store.create_record(new_detection("alice", ts)).await.unwrap();
        let listed = store.list_by_user("alice", 1).await.unwrap();
        assert_eq!(listed[0], created);
    }

    #[tokio::test]
    async fn test_update_by_id() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let rec = store.create_record(new_detection("alice", Utc::now())).await.unwrap();

        let updated = store
            .update_by_id(
                &rec.id,
                DetectionUpdate {
                    assigned_to: Some("grandma".into()),
                    category: None,
                    is_processed: true,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.assigned_to.as_deref(), Some("grandma"));
        assert_eq!(updated.category, None);
        assert!(updated.is_processed);

        let missing = store
            .update_by_id("no-such-id", DetectionUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_mark_processed_keeps_classification() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let rec = store.create_record(new_detection("alice", Utc::now())).await.unwrap();
        store
            .update_by_id(
                &rec.id,
                DetectionUpdate {
                    assigned_to: Some("grandma".into()),
                    category: Some("family".into()),
                    is_processed: false,
                },
            )
            .await
            .unwrap();

        let processed = store.mark_processed(&rec.id).await.unwrap().unwrap();
        assert!(processed.is_processed);
        assert_eq!(processed.assigned_to.as_deref(), Some("grandma"));
        assert_eq!(processed.category.as_deref(), Some("family"));

        assert!(store.mark_processed("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let rec = store.create_record(new_detection("alice", Utc::now())).await.unwrap();

        assert!(store.delete_by_id(&rec.id).await.unwrap());
        assert!(!store.delete_by_id(&rec.id).await.unwrap());
        assert!(store.list_by_user("alice", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/detections.db");
        let store = SqliteStore::open(&path).await.unwrap();
        store.create_record(new_detection("alice", Utc::now())).await.unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_by_user("alice", 10).await.unwrap().len(), 1);
    }
}
