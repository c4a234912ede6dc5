//! Persistent key-value table holding the last-observed field snapshot for
//! every tracked item, keyed by `(resource, item_id)`.
//!
//! The production deployment this was distilled from used an Azure Table
//! Storage-shaped row: a partition key, a row key, and a handful of string
//! columns. SQLite gives us the same shape (partition/row-key primary key,
//! a JSON blob column, a couple of metadata columns) without an external
//! dependency, which is why [`SqliteStateStore`] models the table that way
//! rather than as a generic ORM entity.

mod trim;

use std::path::Path;

use flowbridge_common::{FieldMap, ItemId, ItemSnapshot, Resource};
use r2d2_sqlite::SqliteConnectionManager;
use time::OffsetDateTime;

pub use trim::{trim_to_cap, ROW_SIZE_CAP_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("state store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("state store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored fields are not valid JSON: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("captured_at timestamp could not be parsed: {0}")]
    Timestamp(#[from] time::error::Parse),
    #[error("captured_at timestamp could not be formatted: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

/// Row-key prefix, mirroring the `item_{item_id}` convention from §6.3.
fn row_key(item_id: &ItemId) -> String {
    format!("item_{}", item_id.as_str())
}

/// Operations the change-detection engine and the baseline-init endpoint
/// need. A trait (rather than exposing `SqliteStateStore` directly) keeps
/// `flowbridge-change-detector` testable with an in-memory fake.
pub trait StateStore: Send + Sync {
    fn get(
        &self,
        resource: &Resource,
        item_id: &ItemId,
    ) -> Result<Option<ItemSnapshot>, StateStoreError>;

    /// Idempotent replace of the snapshot for one item.
    fn put(
        &self,
        resource: &Resource,
        item_id: &ItemId,
        fields: FieldMap,
    ) -> Result<(), StateStoreError>;

    /// Seeds many snapshots for one resource at once, used by the
    /// baseline-initialization endpoint (`POST /states/init`).
    fn batch_init(
        &self,
        resource: &Resource,
        fields_by_id: Vec<(ItemId, FieldMap)>,
    ) -> Result<(), StateStoreError>;
}

/// SQLite-backed [`StateStore`], pooled with `r2d2` the way the rest of the
/// workspace pools its blocking database connections.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = r2d2::Pool::new(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StateStoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StateStoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                partition   TEXT NOT NULL,
                row_key     TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                version     TEXT,
                PRIMARY KEY (partition, row_key)
            );",
        )?;
        Ok(())
    }

    fn write_row(
        &self,
        resource: &Resource,
        item_id: &ItemId,
        fields: &FieldMap,
        captured_at: OffsetDateTime,
    ) -> Result<(), StateStoreError> {
        let fields = trim_to_cap(fields, ROW_SIZE_CAP_BYTES);
        let fields_json = serde_json::to_string(&fields)?;
        if fields_json.len() > ROW_SIZE_CAP_BYTES {
            tracing::warn!(
                resource = resource.as_str(),
                item_id = item_id.as_str(),
                bytes = fields_json.len(),
                "snapshot still exceeds row size cap after trimming"
            );
        }
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO snapshots (partition, row_key, fields_json, captured_at, version)
             VALUES (?1, ?2, ?3, ?4, NULL)
             ON CONFLICT(partition, row_key) DO UPDATE SET
                fields_json = excluded.fields_json,
                captured_at = excluded.captured_at",
            rusqlite::params![
                resource.normalized(),
                row_key(item_id),
                fields_json,
                captured_at.format(&time::format_description::well_known::Rfc3339)?,
            ],
        )?;
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn get(
        &self,
        resource: &Resource,
        item_id: &ItemId,
    ) -> Result<Option<ItemSnapshot>, StateStoreError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT fields_json, captured_at, version FROM snapshots
                 WHERE partition = ?1 AND row_key = ?2",
                rusqlite::params![resource.normalized(), row_key(item_id)],
                |row| {
                    let fields_json: String = row.get(0)?;
                    let captured_at: String = row.get(1)?;
                    let version: Option<String> = row.get(2)?;
                    Ok((fields_json, captured_at, version))
                },
            )
            .ok();

        let Some((fields_json, captured_at, version)) = row else {
            return Ok(None);
        };
        let fields: FieldMap = serde_json::from_str(&fields_json)?;
        let captured_at =
            OffsetDateTime::parse(&captured_at, &time::format_description::well_known::Rfc3339)?;
        Ok(Some(ItemSnapshot {
            resource: resource.clone(),
            item_id: item_id.clone(),
            fields,
            captured_at,
            etag_or_version: version,
        }))
    }

    fn put(
        &self,
        resource: &Resource,
        item_id: &ItemId,
        fields: FieldMap,
    ) -> Result<(), StateStoreError> {
        self.write_row(resource, item_id, &fields, flowbridge_common::time_util::now())
    }

    fn batch_init(
        &self,
        resource: &Resource,
        fields_by_id: Vec<(ItemId, FieldMap)>,
    ) -> Result<(), StateStoreError> {
        let now = flowbridge_common::time_util::now();
        for (item_id, fields) in fields_by_id {
            self.write_row(resource, &item_id, &fields, now)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteStateStore {
        SqliteStateStore::in_memory().unwrap()
    }

    #[test]
    fn get_on_unknown_key_returns_none() {
        let store = store();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        assert_eq!(store.get(&resource, &item_id).unwrap(), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        let fields = FieldMap::from([("Status".to_string(), json!("Draft"))]);
        store.put(&resource, &item_id, fields.clone()).unwrap();

        let snapshot = store.get(&resource, &item_id).unwrap().unwrap();
        assert_eq!(snapshot.fields, fields);
    }

    #[test]
    fn put_is_idempotent_replace() {
        let store = store();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        store
            .put(
                &resource,
                &item_id,
                FieldMap::from([("Status".to_string(), json!("Draft"))]),
            )
            .unwrap();
        store
            .put(
                &resource,
                &item_id,
                FieldMap::from([("Status".to_string(), json!("Approved"))]),
            )
            .unwrap();

        let snapshot = store.get(&resource, &item_id).unwrap().unwrap();
        assert_eq!(snapshot.fields.get("Status"), Some(&json!("Approved")));
    }

    #[test]
    fn batch_init_seeds_many_items() {
        let store = store();
        let resource = Resource::from("sites/a/lists/b");
        store
            .batch_init(
                &resource,
                vec![
                    (ItemId::from("1"), FieldMap::from([("x".to_string(), json!(1))])),
                    (ItemId::from("2"), FieldMap::from([("x".to_string(), json!(2))])),
                ],
            )
            .unwrap();

        assert!(store.get(&resource, &ItemId::from("1")).unwrap().is_some());
        assert!(store.get(&resource, &ItemId::from("2")).unwrap().is_some());
    }

    #[test]
    fn different_resources_do_not_collide() {
        let store = store();
        let item_id = ItemId::from("1");
        store
            .put(
                &Resource::from("sites/a/lists/b"),
                &item_id,
                FieldMap::from([("x".to_string(), json!("a"))]),
            )
            .unwrap();
        store
            .put(
                &Resource::from("sites/a/lists/c"),
                &item_id,
                FieldMap::from([("x".to_string(), json!("c"))]),
            )
            .unwrap();

        let a = store
            .get(&Resource::from("sites/a/lists/b"), &item_id)
            .unwrap()
            .unwrap();
        assert_eq!(a.fields.get("x"), Some(&json!("a")));
    }
}
