pub mod key;
pub mod policy;
pub mod populator;
pub mod resolver;
pub mod sweeper;

use crate::clock::Clock;
use crate::store::{ArtifactStore, StoreError};
use crate::upstream::Fetcher;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use policy::FreshnessPolicy;
pub use populator::Populator;
pub use resolver::CacheResolver;
pub use sweeper::Sweeper;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Upstream returned HTTP {status}: {detail}")]
    Upstream { status: u16, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One stored fetch result for a city. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: String,
    pub payload: Bytes,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub artifact: Artifact,
    pub status: CacheStatus,
}

/// Read-through weather cache: serve the newest fresh artifact for a city,
/// or fetch, persist and serve a new one.
pub struct WeatherCache {
    resolver: CacheResolver,
    populator: Populator,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
}

impl WeatherCache {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        policy: FreshnessPolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            resolver: CacheResolver::new(store.clone()),
            populator: Populator::new(store, fetcher, clock.clone(), fetch_timeout),
            policy,
            clock,
        }
    }

    /// Store failures during lookup fail the request rather than falling
    /// through to upstream.
    pub async fn get_weather(&self, city: &str) -> Result<CacheOutcome, CacheError> {
        if let Some(artifact) = self.resolver.read_latest(city).await? {
            if self.policy.is_fresh(artifact.last_modified, self.clock.now()) {
                tracing::debug!(city, key = %artifact.key, "Cache hit");
                return Ok(CacheOutcome {
                    artifact,
                    status: CacheStatus::Hit,
                });
            }
            tracing::debug!(city, key = %artifact.key, "Newest artifact is stale, refetching");
        }

        tracing::debug!(city, "Cache miss");
        let artifact = self.populator.populate(city).await?;
        Ok(CacheOutcome {
            artifact,
            status: CacheStatus::Miss,
        })
    }
}
