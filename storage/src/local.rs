//! In-process local record store.

use async_trait::async_trait;
use dashmap::DashMap;
use errors::StorageError;
use idp_core::{Attributes, LocalStore};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

const BACKEND: &str = "memory";

/// Local store keeping rows in a concurrent map keyed by the assigned `id`.
pub struct InMemoryLocalStore {
    rows: DashMap<i64, Attributes>,
    next_id: AtomicI64
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1)
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Snapshot of every stored row, ordered by id.
    pub fn rows(&self) -> Vec<Attributes> {
        let mut rows: Vec<(i64, Attributes)> = self
            .rows
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn row_id(attributes: &Attributes) -> Option<i64> {
    match attributes.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None
    }
}

fn column_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn find_by(&self, column: &str, value: &str) -> Result<Option<Attributes>, StorageError> {
        let found = self
            .rows
            .iter()
            .filter(|r| r.value().get(column).is_some_and(|v| column_matches(v, value)))
            .min_by_key(|r| *r.key())
            .map(|r| r.value().clone());
        Ok(found)
    }

    async fn save(&self, attributes: &Attributes) -> Result<Attributes, StorageError> {
        let mut row = attributes.clone();
        match row_id(attributes) {
            Some(id) => {
                if !self.rows.contains_key(&id) {
                    return Err(StorageError::NotFound {
                        backend: BACKEND.to_string(),
                        id: id.to_string()
                    });
                }
                row.insert("id".to_string(), Value::from(id));
                self.rows.insert(id, row.clone());
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                row.insert("id".to_string(), Value::from(id));
                self.rows.insert(id, row.clone());
            }
        }
        Ok(row)
    }

    async fn delete(&self, attributes: &Attributes) -> Result<bool, StorageError> {
        Ok(row_id(attributes).is_some_and(|id| self.rows.remove(&id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_sequential_ids() {
        let store = InMemoryLocalStore::new();
        let first = store.save(&attrs(json!({"uid": "u1"}))).await.unwrap();
        let second = store.save(&attrs(json!({"uid": "u2"}))).await.unwrap();

        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_existing_row() {
        let store = InMemoryLocalStore::new();
        let mut row = store
            .save(&attrs(json!({"uid": "u1", "role": "admin"})))
            .await
            .unwrap();
        row.insert("role".to_string(), json!("viewer"));
        store.save(&row).await.unwrap();

        let found = store.find_by("uid", "u1").await.unwrap().unwrap();
        assert_eq!(found["role"], json!("viewer"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = InMemoryLocalStore::new();
        let result = store.save(&attrs(json!({"id": 42, "uid": "u1"}))).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_by_numeric_and_missing_columns() {
        let store = InMemoryLocalStore::new();
        store
            .save(&attrs(json!({"uid": "u1", "tier": 3})))
            .await
            .unwrap();

        assert!(store.find_by("tier", "3").await.unwrap().is_some());
        assert!(store.find_by("id", "1").await.unwrap().is_some());
        assert!(store.find_by("uid", "u2").await.unwrap().is_none());
        assert!(store.find_by("missing", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryLocalStore::new();
        let row = store.save(&attrs(json!({"uid": "u1"}))).await.unwrap();

        assert!(store.delete(&row).await.unwrap());
        assert!(!store.delete(&row).await.unwrap());
        assert!(!store.delete(&attrs(json!({"uid": "u1"}))).await.unwrap());
        assert!(store.is_empty());
    }
}
