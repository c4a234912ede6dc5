//! Persisted tracking-list rows (§6.3 "Tracking record row"), mirroring the
//! partition/row-key shape [`flowbridge_state_store::SqliteStateStore`] uses
//! for snapshots — `partition = "subscription"`, `row_key = subscription_id`.

use std::path::Path;

use flowbridge_common::{Resource, TrackingRecord, TrackingStatus};
use r2d2_sqlite::SqliteConnectionManager;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum TrackingStoreError {
    #[error("tracking store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("tracking store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("expires_at timestamp could not be parsed: {0}")]
    Timestamp(#[from] time::error::Parse),
    #[error("expires_at timestamp could not be formatted: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

#[derive(Clone)]
pub struct TrackingStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl TrackingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackingStoreError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = r2d2::Pool::new(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, TrackingStoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), TrackingStoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracking_records (
                subscription_id    TEXT PRIMARY KEY,
                resource           TEXT NOT NULL,
                client_state       TEXT NOT NULL,
                expires_at         TEXT NOT NULL,
                description        TEXT NOT NULL,
                notification_count INTEGER NOT NULL DEFAULT 0,
                status             TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn upsert(&self, record: &TrackingRecord) -> Result<(), TrackingStoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO tracking_records
                (subscription_id, resource, client_state, expires_at, description, notification_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(subscription_id) DO UPDATE SET
                resource = excluded.resource,
                client_state = excluded.client_state,
                expires_at = excluded.expires_at,
                description = excluded.description,
                status = excluded.status",
            rusqlite::params![
                record.subscription_id,
                record.resource.as_str(),
                record.client_state,
                record.expires_at.format(&time::format_description::well_known::Rfc3339)?,
                record.description,
                record.notification_count as i64,
                status_wire(record.status),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, subscription_id: &str) -> Result<Option<TrackingRecord>, TrackingStoreError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT subscription_id, resource, client_state, expires_at, description, notification_count, status
                 FROM tracking_records WHERE subscription_id = ?1",
                rusqlite::params![subscription_id],
                row_to_record,
            )
            .ok();
        row.transpose()
    }

    pub fn list(&self) -> Result<Vec<TrackingRecord>, TrackingStoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT subscription_id, resource, client_state, expires_at, description, notification_count, status
             FROM tracking_records",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn mark_deleted(&self, subscription_id: &str) -> Result<(), TrackingStoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE tracking_records SET status = ?2 WHERE subscription_id = ?1",
            rusqlite::params![subscription_id, status_wire(TrackingStatus::Deleted)],
        )?;
        Ok(())
    }

    pub fn increment_notification_count(&self, subscription_id: &str) -> Result<(), TrackingStoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE tracking_records SET notification_count = notification_count + 1 WHERE subscription_id = ?1",
            rusqlite::params![subscription_id],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<TrackingRecord, TrackingStoreError>> {
    let subscription_id: String = row.get(0)?;
    let resource: String = row.get(1)?;
    let client_state: String = row.get(2)?;
    let expires_at: String = row.get(3)?;
    let description: String = row.get(4)?;
    let notification_count: i64 = row.get(5)?;
    let status: String = row.get(6)?;
    Ok((|| {
        Ok(TrackingRecord {
            subscription_id,
            resource: Resource::from(resource),
            client_state,
            expires_at: OffsetDateTime::parse(&expires_at, &time::format_description::well_known::Rfc3339)?,
            description,
            notification_count: notification_count as u64,
            status: status_from_wire(&status),
        })
    })())
}

fn status_wire(status: TrackingStatus) -> &'static str {
    match status {
        TrackingStatus::Active => "active",
        TrackingStatus::Deleted => "deleted",
    }
}

fn status_from_wire(raw: &str) -> TrackingStatus {
    match raw {
        "deleted" => TrackingStatus::Deleted,
        _ => TrackingStatus::Active,
    }
}
