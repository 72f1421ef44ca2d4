use super::key::{belongs_to, city_prefix};
use super::Artifact;
use crate::store::{scan, ArtifactStore, ObjectSummary, StoreError};
use std::sync::Arc;

/// Read path of the cache: locates the newest artifact written for a city.
pub struct CacheResolver {
    store: Arc<dyn ArtifactStore>,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Newest artifact for `city` across every listing page, or `None` when
    /// nothing has been written yet. Ties on `last_modified` go to the
    /// greater key.
    pub async fn find_latest(&self, city: &str) -> Result<Option<ObjectSummary>, StoreError> {
        let mut latest: Option<ObjectSummary> = None;

        scan(self.store.as_ref(), &city_prefix(city), |item| {
            if !belongs_to(&item.key, city) {
                return;
            }
            let newer = match &latest {
                Some(best) => {
                    (item.last_modified, item.key.as_str())
                        > (best.last_modified, best.key.as_str())
                }
                None => true,
            };
            if newer {
                latest = Some(item);
            }
        })
        .await?;

        Ok(latest)
    }

    /// Locate and load the newest artifact for `city`.
    ///
    /// An object that vanishes between the listing and the read (a sweep got
    /// there first) is reported as a miss.
    pub async fn read_latest(&self, city: &str) -> Result<Option<Artifact>, StoreError> {
        let Some(summary) = self.find_latest(city).await? else {
            return Ok(None);
        };

        match self.store.get(&summary.key).await {
            Ok(payload) => Ok(Some(Artifact {
                key: summary.key,
                payload,
                last_modified: summary.last_modified,
            })),
            Err(e) if e.is_not_found() => {
                tracing::debug!(key = %summary.key, "Artifact evicted between list and get");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
