pub mod memory;
pub mod object;
pub mod timeout;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use object::ObjectStoreBackend;
pub use timeout::TimeoutStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Object store error: {0}")]
    Backend(#[from] object_store::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
            || matches!(self, StoreError::Backend(object_store::Error::NotFound { .. }))
    }
}

/// Listing entry: a key and the time the store last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing. `next_token` is `None` once the listing is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// Key/value-with-timestamp view of an object store.
///
/// Implementations must be safe to call concurrently; no extra locking is
/// layered on top. `delete` of an absent key succeeds.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError>;

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Walk every page under `prefix`, handing each summary to `visit`.
///
/// Returns the number of objects visited.
pub async fn scan<F>(
    store: &dyn ArtifactStore,
    prefix: &str,
    mut visit: F,
) -> Result<usize, StoreError>
where
    F: FnMut(ObjectSummary),
{
    let mut token: Option<String> = None;
    let mut seen = 0;

    loop {
        let page = store.list_page(prefix, token.as_deref()).await?;
        seen += page.items.len();
        for item in page.items {
            visit(item);
        }

        match page.next_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            Some(next) => {
                return Err(StoreError::Unavailable(format!(
                    "listing did not advance past token {}",
                    next
                )));
            }
            None => return Ok(seen),
        }
    }
}
