use super::{ArtifactStore, ListPage, ObjectSummary, StoreError};
use crate::clock::Clock;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    payload: Bytes,
    last_modified: DateTime<Utc>,
}

/// Process-local store. Lists in key order, `page_size` items at a time,
/// with the last key of a page as the continuation token.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_page_size(clock, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(clock: Arc<dyn Clock>, page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
            page_size: page_size.max(1),
        }
    }

    /// Insert with an explicit timestamp, bypassing the clock.
    #[cfg(test)]
    pub fn insert_at(&self, key: &str, payload: Bytes, last_modified: DateTime<Utc>) {
        self.write_objects().insert(
            key.to_string(),
            StoredObject {
                payload,
                last_modified,
            },
        );
    }

    #[cfg(test)]
    pub fn keys(&self) -> Vec<String> {
        self.read_objects().keys().cloned().collect()
    }

    fn read_objects(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        // A poisoned lock only means a panic elsewhere mid-insert; the map is still usable.
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_objects(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        let last_modified = self.clock.now();
        self.write_objects().insert(
            key.to_string(),
            StoredObject {
                payload,
                last_modified,
            },
        );
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let objects = self.read_objects();
        let lower = match token {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                last_modified: obj.last_modified,
            });

        let items: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let next_token = if matching.next().is_some() {
            items.last().map(|item| item.key.clone())
        } else {
            None
        };

        Ok(ListPage { items, next_token })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.read_objects()
            .get(key)
            .map(|obj| obj.payload.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write_objects().remove(key);
        Ok(())
    }
}
