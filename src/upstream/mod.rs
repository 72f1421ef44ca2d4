pub mod mock;
pub mod openweather;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Rate limited, retry after: {0}s")]
    RateLimited(u64),
}

/// Raw upstream answer. The body is kept as bytes and never interpreted.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Current-weather source for a city.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<UpstreamResponse, FetchError>;
}
