use super::{ArtifactStore, ListPage, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

/// Bounds every call on the wrapped store. An elapsed call is a
/// `StoreError::Timeout`; nothing is retried here.
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.limit, op)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl<S: ArtifactStore> ArtifactStore for TimeoutStore<S> {
    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.bounded(self.inner.put(key, payload)).await
    }

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.bounded(self.inner.list_page(prefix, token)).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(self.inner.delete(key)).await
    }
}
