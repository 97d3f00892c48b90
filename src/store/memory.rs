//! In-memory store fake for tests
//!
//! Mirrors the backend's observable behavior: exact-match filters, empty
//! filters fail closed, `created_at` stamped on insert. Call counters let
//! tests assert which operations actually reached the store.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde_json::Value;

use super::{Filters, RecordStore, StoreError, http::stamp_created_at};

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Total documents currently held in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |rows| rows.len())
    }
}

fn matches(document: &Value, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, collection: &str, mut document: Value) -> Result<Value, StoreError> {
        stamp_created_at(&mut document);
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn select(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<Value>, StoreError> {
        let Some(rows) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| filters.is_none_or(|f| matches(row, f)))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        filters: &Filters,
        patch: Value,
    ) -> Result<(), StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilters("update"));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        let Some(patch_fields) = patch.as_object() else {
            return Err(StoreError::Backend("patch must be an object".to_string()));
        };
        if let Some(mut rows) = self.collections.get_mut(collection) {
            for row in rows.iter_mut().filter(|row| matches(row, filters)) {
                if let Some(fields) = row.as_object_mut() {
                    for (key, value) in patch_fields {
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, filters: &Filters) -> Result<(), StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilters("delete"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(mut rows) = self.collections.get_mut(collection) {
            rows.retain(|row| !matches(row, filters));
        }
        Ok(())
    }

    async fn count(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<u64, StoreError> {
        Ok(self.select(collection, filters).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::user_guild_filters;
    use serde_json::json;

    #[tokio::test]
    async fn test_select_is_exact_match_only() {
        let store = MemoryStore::new();
        store
            .insert("warns", json!({"user_id": "1", "guild_id": "2", "count": 1}))
            .await
            .unwrap();
        store
            .insert("warns", json!({"user_id": "1", "guild_id": "3", "count": 1}))
            .await
            .unwrap();

        let rows = store
            .select("warns", Some(&user_guild_filters(1, 2)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let all = store.select("warns", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let missing = store.select("mutes", None).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_update_patches_matching_rows() {
        let store = MemoryStore::new();
        store
            .insert("warns", json!({"user_id": "1", "guild_id": "2", "count": 3}))
            .await
            .unwrap();

        let mut filters = user_guild_filters(1, 2);
        filters.insert("count".to_string(), json!(3));
        store
            .update("warns", &filters, json!({"punishment_level": "MUTE"}))
            .await
            .unwrap();

        let rows = store.select("warns", None).await.unwrap();
        assert_eq!(rows[0]["punishment_level"], "MUTE");
    }

    #[tokio::test]
    async fn test_empty_filters_do_not_mutate() {
        let store = MemoryStore::new();
        store
            .insert("warns", json!({"user_id": "1", "guild_id": "2"}))
            .await
            .unwrap();

        let empty = Filters::new();
        assert!(store.update("warns", &empty, json!({"x": 1})).await.is_err());
        assert!(store.delete("warns", &empty).await.is_err());
        assert_eq!(store.len("warns"), 1);
        assert_eq!(store.update_count(), 0);
        assert_eq!(store.delete_count(), 0);
    }

    #[tokio::test]
    async fn test_count_with_filters() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .insert("warns", json!({"user_id": "1", "guild_id": "2"}))
                .await
                .unwrap();
        }
        store
            .insert("warns", json!({"user_id": "9", "guild_id": "2"}))
            .await
            .unwrap();

        let count = store
            .count("warns", Some(&user_guild_filters(1, 2)))
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(store.count("warns", None).await.unwrap(), 4);
    }
}
