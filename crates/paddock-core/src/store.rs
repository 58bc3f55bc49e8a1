//! Document store contract.
//!
//! The real product runs against a hosted document database; the engines
//! only see this trait. Writes are either single-document, batched (the
//! provider imposes a batch ceiling, so the materializer flushes in
//! chunks), or a single-document compare-and-set — the one transactional
//! primitive the engines need to close check-then-write gaps.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Comparison operator for a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One field predicate. Filters combine conjunctively.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op, value: value.into() }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Le, value)
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ge, value)
    }

    /// Evaluate this predicate against a document.
    ///
    /// Ordering comparisons are defined for strings and numbers; anything
    /// else only supports Eq/Ne. A missing field never matches.
    pub fn matches(&self, doc: &Value) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                let Some(ord) = compare_values(actual, &self.value) else {
                    return false;
                };
                match self.op {
                    FilterOp::Lt => ord == std::cmp::Ordering::Less,
                    FilterOp::Le => ord != std::cmp::Ordering::Greater,
                    FilterOp::Gt => ord == std::cmp::Ordering::Greater,
                    FilterOp::Ge => ord != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b))
        }
        _ => None,
    }
}

/// A single operation inside a batched write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { collection: String, id: String, doc: Value },
    Update { collection: String, id: String, patch: Value },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn put(collection: &str, id: &str, doc: Value) -> Self {
        WriteOp::Put { collection: collection.to_string(), id: id.to_string(), doc }
    }

    pub fn update(collection: &str, id: &str, patch: Value) -> Self {
        WriteOp::Update { collection: collection.to_string(), id: id.to_string(), patch }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOp::Delete { collection: collection.to_string(), id: id.to_string() }
    }
}

/// Abstract document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Create or replace a document.
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Deep-merge `patch` into an existing document. Object values merge
    /// recursively, everything else replaces. Errors if the document does
    /// not exist.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Conjunctive filter query with optional ordering (ascending, by a
    /// top-level field) and limit. Returns `(id, document)` pairs.
    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Value)>>;

    /// Apply the operations atomically and in order.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Apply `patch` only if `field` currently equals `expected`. Returns
    /// whether the write happened. A missing document never matches.
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Value,
    ) -> Result<bool>;
}

/// Recursive merge used by `update`: objects merge key-by-key, any other
/// value (including null) replaces.
pub fn merge_patch(doc: &mut Value, patch: &Value) {
    match (doc, patch) {
        (Value::Object(doc), Value::Object(patch)) => {
            for (key, value) in patch {
                match doc.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_patch(existing, value);
                    }
                    _ => {
                        doc.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (doc, patch) => *doc = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_strings_and_numbers() {
        let doc = json!({"status": "pending", "attempts": 3});
        assert!(FieldFilter::eq("status", "pending").matches(&doc));
        assert!(!FieldFilter::eq("status", "sent").matches(&doc));
        assert!(FieldFilter::ge("attempts", 3).matches(&doc));
        assert!(FieldFilter::lt("attempts", 4).matches(&doc));
        // missing field never matches
        assert!(!FieldFilter::eq("channel", "push").matches(&doc));
    }

    #[test]
    fn iso_dates_order_lexicographically() {
        let doc = json!({"scheduled_date": "2024-02-15"});
        assert!(FieldFilter::ge("scheduled_date", "2024-01-01").matches(&doc));
        assert!(FieldFilter::le("scheduled_date", "2024-03-01").matches(&doc));
        assert!(!FieldFilter::lt("scheduled_date", "2024-02-15").matches(&doc));
    }

    #[test]
    fn merge_patch_is_recursive_for_objects() {
        let mut doc = json!({"delivery_status": {"email": "sent"}, "read": false});
        merge_patch(&mut doc, &json!({"delivery_status": {"push": "failed"}}));
        assert_eq!(doc["delivery_status"]["email"], "sent");
        assert_eq!(doc["delivery_status"]["push"], "failed");
        assert_eq!(doc["read"], false);
    }
}
