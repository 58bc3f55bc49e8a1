//! In-memory document store.
//!
//! Collections are `BTreeMap`s keyed by document id, so unordered queries
//! still come back in a stable order. All operations run under one lock,
//! which also makes `batch_write` and `compare_and_set` atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use paddock_core::error::{PaddockError, Result};
use paddock_core::store::{merge_patch, DocumentStore, FieldFilter, WriteOp};

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection. Test helper.
    pub async fn count(&self, collection: &str) -> usize {
        self.data.lock().await.get(collection).map_or(0, BTreeMap::len)
    }
}

fn apply_op(data: &mut HashMap<String, BTreeMap<String, Value>>, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Put { collection, id, doc } => {
            data.entry(collection).or_default().insert(id, doc);
        }
        WriteOp::Update { collection, id, patch } => {
            let doc = data
                .get_mut(&collection)
                .and_then(|c| c.get_mut(&id))
                .ok_or_else(|| PaddockError::Store(format!("update missing doc {collection}/{id}")))?;
            merge_patch(doc, &patch);
        }
        WriteOp::Delete { collection, id } => {
            if let Some(c) = data.get_mut(&collection) {
                c.remove(&id);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().await.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.data.lock().await.entry(collection.to_string()).or_default().insert(id.to_string(), doc);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut data = self.data.lock().await;
        apply_op(&mut data, WriteOp::update(collection, id, patch))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        apply_op(&mut data, WriteOp::delete(collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Value)>> {
        let data = self.data.lock().await;
        let mut rows: Vec<(String, Value)> = data
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|(_, doc)| filters.iter().all(|f| f.matches(doc)))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        if let Some(field) = order_by {
            rows.sort_by(|(_, a), (_, b)| {
                let a = a.get(field);
                let b = b.get(field);
                format_sort_key(a).cmp(&format_sort_key(b))
            });
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut data = self.data.lock().await;
        for op in ops {
            apply_op(&mut data, op)?;
        }
        Ok(())
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Value,
    ) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(doc) = data.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Ok(false);
        };
        if doc.get(field) != Some(expected) {
            return Ok(false);
        }
        merge_patch(doc, &patch);
        Ok(true)
    }
}

fn format_sort_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
