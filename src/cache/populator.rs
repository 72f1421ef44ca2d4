use super::key::artifact_key;
use super::{Artifact, CacheError};
use crate::clock::Clock;
use crate::store::ArtifactStore;
use crate::upstream::{FetchError, Fetcher};
use std::sync::Arc;
use std::time::Duration;

/// Write path of the cache: fetch from upstream, persist, hand back.
pub struct Populator {
    store: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
}

impl Populator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            fetch_timeout,
        }
    }

    /// Fetch fresh data for `city` and write it under a new key.
    ///
    /// Nothing is written unless upstream answers with a 2xx. A failed store
    /// write is logged and the fetched payload is still returned.
    pub async fn populate(&self, city: &str) -> Result<Artifact, CacheError> {
        let response = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(city)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(upstream_failure(e)),
            Err(_) => {
                return Err(CacheError::Upstream {
                    status: 504,
                    detail: format!("Upstream did not answer within {:?}", self.fetch_timeout),
                })
            }
        };

        if !response.is_success() {
            tracing::warn!(city, status = response.status, "Upstream rejected weather request");
            return Err(CacheError::Upstream {
                status: response.status,
                detail: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let fetched_at = self.clock.now();
        let key = artifact_key(city, fetched_at);

        if let Err(e) = self.store.put(&key, response.body.clone()).await {
            tracing::warn!(city, key = %key, "Failed to persist artifact, serving uncached: {}", e);
        } else {
            tracing::debug!(city, key = %key, bytes = response.body.len(), "Artifact stored");
        }

        Ok(Artifact {
            key,
            payload: response.body,
            last_modified: fetched_at,
        })
    }
}

fn upstream_failure(e: FetchError) -> CacheError {
    let status = match &e {
        FetchError::RateLimited(_) => 429,
        FetchError::RequestFailed(err) if err.is_timeout() => 504,
        FetchError::RequestFailed(_) => 502,
    };
    tracing::error!("Weather fetch failed: {}", e);
    CacheError::Upstream {
        status,
        detail: e.to_string(),
    }
}
