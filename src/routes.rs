use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    cache::{CacheError, WeatherCache},
    config::Config,
    store::StoreError,
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<WeatherCache>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Client-facing failure. Serialized as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: Value::String("Not Found".to_string()),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Upstream { status, detail } => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                // Pass the upstream's own JSON error document through when it has one.
                let detail = serde_json::from_str(&detail).unwrap_or(Value::String(detail));
                Self { status, detail }
            }
            CacheError::Store(e) => {
                let status = match e {
                    StoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::SERVICE_UNAVAILABLE,
                };
                Self {
                    status,
                    detail: Value::String(format!("Weather cache unavailable: {}", e)),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// Route handlers
pub async fn homepage() -> Json<Value> {
    Json(json!({ "Hello": "World" }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Response, ApiError> {
    let city = params
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(state.config.default_city.as_str());

    let outcome = state.cache.get_weather(city).await.map_err(|e| {
        tracing::error!(city, "Weather request failed: {}", e);
        ApiError::from(e)
    })?;

    tracing::info!(city, cache = outcome.status.as_str(), "Served weather");

    let mut response = outcome.artifact.payload.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-cache", HeaderValue::from_static(outcome.status.as_str()));
    Ok(response)
}

pub async fn fallback() -> ApiError {
    ApiError::not_found()
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/health", get(health))
        .route("/weather", get(get_weather))
        .fallback(fallback)
        .with_state(state)
}
