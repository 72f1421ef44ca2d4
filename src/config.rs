use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    S3,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "s3" => Ok(StoreBackend::S3),
            other => Err(anyhow::anyhow!(
                "unknown STORE_BACKEND {:?} (expected \"memory\" or \"s3\")",
                other
            )),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub openweather_weather_path: String,
    pub default_city: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub store_bucket: String,
    pub store_endpoint: Option<String>,
    pub store_region: String,
    pub store_list_page_size: usize,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub upstream_timeout: Duration,
    pub store_timeout: Duration,
}

/// The API key is never printed.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "openweather_api_key",
                &self.openweather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openweather_base_url", &self.openweather_base_url)
            .field("openweather_weather_path", &self.openweather_weather_path)
            .field("default_city", &self.default_city)
            .field("bind_addr", &self.bind_addr)
            .field("store_backend", &self.store_backend)
            .field("store_bucket", &self.store_bucket)
            .field("store_endpoint", &self.store_endpoint)
            .field("store_region", &self.store_region)
            .field("store_list_page_size", &self.store_list_page_size)
            .field("retention", &self.retention)
            .field("sweep_interval", &self.sweep_interval)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        Ok(Config {
            openweather_api_key: var("OPENWEATHER_API_KEY").or_else(|| var("openweatherkey")),
            openweather_base_url: or("OPENWEATHER_BASE_URL", "https://api.openweathermap.org"),
            openweather_weather_path: or("OPENWEATHER_WEATHER_PATH", "/data/2.5/weather"),
            default_city: or("DEFAULT_CITY", "Dhaka"),
            bind_addr: or("BIND_ADDR", "0.0.0.0:8080"),
            store_backend: or("STORE_BACKEND", "memory").parse()?,
            store_bucket: or("STORE_BUCKET", "weather-cache"),
            store_endpoint: var("STORE_ENDPOINT"),
            store_region: or("STORE_REGION", "us-east-1"),
            store_list_page_size: positive(&var, "STORE_LIST_PAGE_SIZE", 1000)?,
            retention: seconds(&var, "CACHE_RETENTION_SECS", 300)?,
            sweep_interval: seconds(&var, "SWEEP_INTERVAL_SECS", 10)?,
            upstream_timeout: seconds(&var, "UPSTREAM_TIMEOUT_SECS", 10)?,
            store_timeout: seconds(&var, "STORE_TIMEOUT_SECS", 5)?,
        })
    }
}

fn positive<F, T>(var: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value = match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is not a valid number ({:?}): {}", name, raw, e))?,
        None => default,
    };
    if value == T::default() {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(value)
}

fn seconds<F>(var: &F, name: &str, default: u64) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    positive(var, name, default).map(Duration::from_secs)
}
