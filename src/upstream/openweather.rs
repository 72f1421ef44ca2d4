use super::{FetchError, Fetcher, UpstreamResponse};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

pub struct OpenWeatherClient {
    client: Client,
    url: String,
    api_key: String,
    /// Total time the 429 backoff may spend. Matches the populator's fetch
    /// deadline, so rate limiting surfaces as 429 rather than a 504 timeout.
    retry_budget: Duration,
}

impl OpenWeatherClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("WeatherCache/1.0")
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}{}",
                config.openweather_base_url, config.openweather_weather_path
            ),
            api_key,
            retry_budget: config.upstream_timeout,
        })
    }

    async fn request_with_retry(&self, params: &[(&str, &str)]) -> Result<UpstreamResponse, FetchError> {
        let started = Instant::now();
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(1000);

        loop {
            let response = self.client.get(&self.url).query(params).send().await?;

            match response.status() {
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retry_count >= MAX_RATE_LIMIT_RETRIES
                        || started.elapsed() + delay >= self.retry_budget
                    {
                        return Err(FetchError::RateLimited(delay.as_secs()));
                    }

                    tracing::warn!(
                        "Rate limited by OpenWeather API, retrying in {}ms",
                        delay.as_millis()
                    );

                    sleep(delay).await;
                    delay = delay.mul_f32(2.0 + fastrand::f32() * 0.5); // Exponential backoff with jitter
                    retry_count += 1;
                }
                status => {
                    let body = response.bytes().await?;
                    return Ok(UpstreamResponse {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Fetcher for OpenWeatherClient {
    async fn fetch(&self, city: &str) -> Result<UpstreamResponse, FetchError> {
        tracing::debug!(city, "Fetching current weather from OpenWeather");
        self.request_with_retry(&[("q", city), ("appid", self.api_key.as_str())])
            .await
    }
}
