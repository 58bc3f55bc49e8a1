//! SQLite-backed document store.
//!
//! One `documents` table keyed by `(collection, id)` with the document as a
//! JSON blob. Filters are evaluated in Rust after a collection scan; the
//! local runner never holds enough documents for that to matter.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use paddock_core::error::{PaddockError, Result};
use paddock_core::store::{merge_patch, DocumentStore, FieldFilter, WriteOp};

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open or create the store database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| PaddockError::Store(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by the store's own tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| PaddockError::Store(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .expect("db lock")
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents (collection);
         ",
            )
            .map_err(|e| PaddockError::Store(format!("Migration: {e}")))?;
        Ok(())
    }
}

fn parse_doc(raw: &str, collection: &str, id: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| PaddockError::Store(format!("corrupt doc {collection}/{id}: {e}")))
}

fn apply_op(tx: &rusqlite::Transaction<'_>, op: &WriteOp) -> Result<()> {
    match op {
        WriteOp::Put { collection, id, doc } => {
            tx.execute(
                "INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
                rusqlite::params![collection, id, doc.to_string()],
            )
            .map_err(|e| PaddockError::Store(format!("put {collection}/{id}: {e}")))?;
        }
        WriteOp::Update { collection, id, patch } => {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                    rusqlite::params![collection, id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(PaddockError::Store(format!("update read: {e}"))),
                })?;
            let raw = raw
                .ok_or_else(|| PaddockError::Store(format!("update missing doc {collection}/{id}")))?;
            let mut doc = parse_doc(&raw, collection, id)?;
            merge_patch(&mut doc, patch);
            tx.execute(
                "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id, doc.to_string()],
            )
            .map_err(|e| PaddockError::Store(format!("update {collection}/{id}: {e}")))?;
        }
        WriteOp::Delete { collection, id } => {
            tx.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
            )
            .map_err(|e| PaddockError::Store(format!("delete {collection}/{id}: {e}")))?;
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("db lock");
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(PaddockError::Store(format!("get: {e}"))),
            })?;
        raw.map(|r| parse_doc(&r, collection, id)).transpose()
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let conn = self.conn.lock().expect("db lock");
        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
            rusqlite::params![collection, id, doc.to_string()],
        )
        .map_err(|e| PaddockError::Store(format!("put {collection}/{id}: {e}")))?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut conn = self.conn.lock().expect("db lock");
        let tx = conn
            .transaction()
            .map_err(|e| PaddockError::Store(format!("tx begin: {e}")))?;
        apply_op(&tx, &WriteOp::update(collection, id, patch))?;
        tx.commit().map_err(|e| PaddockError::Store(format!("tx commit: {e}")))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("db lock");
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )
        .map_err(|e| PaddockError::Store(format!("delete {collection}/{id}: {e}")))?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Value)>> {
        let conn = self.conn.lock().expect("db lock");
        let mut stmt = conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(|e| PaddockError::Store(format!("query prepare: {e}")))?;
        let raw_rows = stmt
            .query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| PaddockError::Store(format!("query: {e}")))?;

        let mut rows = Vec::new();
        for row in raw_rows {
            let (id, raw) = row.map_err(|e| PaddockError::Store(format!("query row: {e}")))?;
            let doc = parse_doc(&raw, collection, &id)?;
            if filters.iter().all(|f| f.matches(&doc)) {
                rows.push((id, doc));
            }
        }

        if let Some(field) = order_by {
            rows.sort_by(|(_, a), (_, b)| {
                let key = |v: &Value| match v.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                key(a).cmp(&key(b))
            });
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut conn = self.conn.lock().expect("db lock");
        let tx = conn
            .transaction()
            .map_err(|e| PaddockError::Store(format!("tx begin: {e}")))?;
        for op in &ops {
            apply_op(&tx, op)?;
        }
        tx.commit().map_err(|e| PaddockError::Store(format!("tx commit: {e}")))
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Value,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().expect("db lock");
        let tx = conn
            .transaction()
            .map_err(|e| PaddockError::Store(format!("tx begin: {e}")))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(PaddockError::Store(format!("cas read: {e}"))),
            })?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let mut doc = parse_doc(&raw, collection, id)?;
        if doc.get(field) != Some(expected) {
            return Ok(false);
        }
        merge_patch(&mut doc, &patch);
        tx.execute(
            "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id, doc.to_string()],
        )
        .map_err(|e| PaddockError::Store(format!("cas write: {e}")))?;
        tx.commit().map_err(|e| PaddockError::Store(format!("tx commit: {e}")))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn roundtrip_and_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("q", "a", json!({"status": "pending", "attempts": 1})).await.unwrap();
        store.put("q", "b", json!({"status": "failed", "attempts": 5})).await.unwrap();

        let pending = store
            .query("q", &[FieldFilter::eq("status", "pending")], None, None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, "a");
    }

    #[tokio::test]
    async fn batch_is_atomic_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .batch_write(vec![
                WriteOp::put("c", "1", json!({"v": 1})),
                WriteOp::update("c", "1", json!({"v": 2})),
            ])
            .await
            .unwrap();
        assert_eq!(store.get("c", "1").await.unwrap().unwrap()["v"], 2);

        // update of a missing doc fails the whole batch
        let err = store
            .batch_write(vec![
                WriteOp::put("c", "2", json!({"v": 1})),
                WriteOp::update("c", "missing", json!({"v": 2})),
            ])
            .await;
        assert!(err.is_err());
        assert!(store.get("c", "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cas_respects_expected_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("q", "1", json!({"status": "pending"})).await.unwrap();
        assert!(store
            .compare_and_set("q", "1", "status", &json!("pending"), json!({"status": "processing"}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_set("q", "1", "status", &json!("pending"), json!({"status": "processing"}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_set("q", "missing", "status", &json!("pending"), json!({}))
            .await
            .unwrap());
    }
}
