use super::{FetchError, Fetcher, UpstreamResponse};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Timelike, Utc};
use serde::Serialize;

/// Offline stand-in for OpenWeather, used when no API key is configured.
/// Produces a current-weather document shaped like `/data/2.5/weather`.
pub struct MockWeatherClient;

#[derive(Debug, Serialize)]
struct CurrentWeather {
    weather: Vec<Condition>,
    main: MainReadings,
    wind: Wind,
    clouds: Clouds,
    dt: i64,
    name: String,
    cod: u16,
}

#[derive(Debug, Serialize)]
struct Condition {
    id: i32,
    main: &'static str,
    description: &'static str,
    icon: &'static str,
}

#[derive(Debug, Serialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Serialize)]
struct Wind {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Serialize)]
struct Clouds {
    all: f64,
}

impl MockWeatherClient {
    pub fn new() -> Self {
        Self
    }

    fn current(&self, city: &str) -> CurrentWeather {
        let now = Utc::now();
        let hour = now.hour() as f64;

        // Kelvin, like the upstream default units.
        let temp = 298.15 + 5.0 * ((hour - 9.0) * std::f64::consts::PI / 12.0).sin();
        let humidity = (60.0 + 20.0 * (hour * 0.26).cos()).clamp(30.0, 90.0);
        let clouds = 30.0 + 40.0 * fastrand::f64();

        let condition = if clouds > 60.0 {
            Condition {
                id: 803,
                main: "Clouds",
                description: "broken clouds",
                icon: "04d",
            }
        } else {
            Condition {
                id: 800,
                main: "Clear",
                description: "clear sky",
                icon: "01d",
            }
        };

        CurrentWeather {
            weather: vec![condition],
            main: MainReadings {
                temp,
                feels_like: temp + 0.02 * humidity,
                pressure: 1008.0 + 8.0 * fastrand::f64(),
                humidity,
            },
            wind: Wind {
                speed: 2.0 + 3.0 * fastrand::f64(),
                deg: 360.0 * fastrand::f64(),
            },
            clouds: Clouds { all: clouds },
            dt: now.timestamp(),
            name: city.to_string(),
            cod: 200,
        }
    }
}

impl Default for MockWeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockWeatherClient {
    async fn fetch(&self, city: &str) -> Result<UpstreamResponse, FetchError> {
        // Serializing plain structs with string keys cannot fail.
        let body = serde_json::to_vec(&self.current(city)).unwrap_or_default();
        Ok(UpstreamResponse {
            status: 200,
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_city_document() {
        let response = MockWeatherClient::new().fetch("Dhaka").await.unwrap();
        assert!(response.is_success());

        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["name"], "Dhaka");
        assert_eq!(doc["cod"], 200);
        assert!(doc["main"]["temp"].as_f64().unwrap() > 250.0);
        let humidity = doc["main"]["humidity"].as_f64().unwrap();
        assert!((30.0..=90.0).contains(&humidity));
    }
}
