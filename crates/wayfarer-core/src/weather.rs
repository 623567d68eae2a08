//! Weather lookups backed by the Open-Meteo public APIs.
//!
//! Destination names are resolved to coordinates through the geocoding
//! API, then the forecast API supplies a daily series. Neither endpoint
//! needs an API key.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Forecast endpoint.
const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Geocoding endpoint.
const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

/// Per-call deadline.
const TIMEOUT_SECS: u64 = 10;

/// Longest forecast Open-Meteo serves; larger requests are clamped.
pub const MAX_FORECAST_DAYS: u32 = 16;

/// Errors from a weather lookup.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather API timed out")]
    Timeout,

    #[error("weather API request failed: {message}")]
    Request { message: String },

    #[error("weather API returned {status}")]
    Api { status: u16 },

    #[error("unknown location: {name:?}")]
    UnknownLocation { name: String },
}

/// A geocoded place.
#[derive(Debug, Clone, Serialize)]
pub struct Coordinates {
    pub name: String,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a forecast applies.
#[derive(Debug, Clone, Serialize)]
pub struct LocationInfo {
    pub name: Option<String>,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

/// One day of forecast.
#[derive(Debug, Clone, Serialize)]
pub struct DailyForecast {
    pub date: String,
    pub weather_code: Option<i32>,
    pub description: String,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub precipitation: Option<f64>,
}

/// Forecast plus the place it was resolved for.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub location: LocationInfo,
    pub daily: Vec<DailyForecast>,
}

/// Client for Open-Meteo geocoding and forecasts.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    forecast_url: String,
    geocoding_url: String,
}

impl WeatherClient {
    pub fn new() -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| WeatherError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            forecast_url: DEFAULT_FORECAST_URL.to_owned(),
            geocoding_url: DEFAULT_GEOCODING_URL.to_owned(),
        })
    }

    /// Point both endpoints at `base_url` (tests).
    pub fn with_urls(
        mut self,
        forecast_url: impl Into<String>,
        geocoding_url: impl Into<String>,
    ) -> Self {
        self.forecast_url = forecast_url.into();
        self.geocoding_url = geocoding_url.into();
        self
    }

    /// Resolve a place name to coordinates.
    pub async fn geocode(&self, name: &str) -> Result<Coordinates, WeatherError> {
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[
                ("name", name),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Api {
                status: status.as_u16(),
            });
        }

        let decoded: GeocodingResponse =
            response.json().await.map_err(|e| WeatherError::Request {
                message: format!("failed to decode geocoding response: {e}"),
            })?;

        let Some(place) = decoded.results.into_iter().next() else {
            return Err(WeatherError::UnknownLocation { name: name.into() });
        };
        debug!(name = %place.name, latitude = place.latitude, longitude = place.longitude, "location resolved");

        Ok(Coordinates {
            name: place.name,
            country: place.country,
            latitude: place.latitude,
            longitude: place.longitude,
        })
    }

    /// Fetch a daily forecast for a coordinate pair.
    ///
    /// `days` is clamped to [`MAX_FORECAST_DAYS`].
    pub async fn forecast(
        &self,
        latitude: f64,
        longitude: f64,
        days: u32,
    ) -> Result<WeatherReport, WeatherError> {
        let days = days.min(MAX_FORECAST_DAYS);
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum"
                        .to_string(),
                ),
                ("temperature_unit", "celsius".to_string()),
                ("precipitation_unit", "mm".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", days.to_string()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Api {
                status: status.as_u16(),
            });
        }

        let decoded: ForecastResponse =
            response.json().await.map_err(|e| WeatherError::Request {
                message: format!("failed to decode forecast response: {e}"),
            })?;

        let daily = decoded
            .daily
            .time
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let code = series_value(&decoded.daily.weather_code, i);
                DailyForecast {
                    date: date.clone(),
                    weather_code: code,
                    description: code
                        .map(describe_weather_code)
                        .unwrap_or_else(|| "unknown".to_string()),
                    temp_max: series_value(&decoded.daily.temperature_2m_max, i),
                    temp_min: series_value(&decoded.daily.temperature_2m_min, i),
                    precipitation: series_value(&decoded.daily.precipitation_sum, i),
                }
            })
            .collect();

        Ok(WeatherReport {
            location: LocationInfo {
                name: None,
                country: None,
                latitude: decoded.latitude,
                longitude: decoded.longitude,
                timezone: decoded.timezone,
            },
            daily,
        })
    }

    /// Geocode a place name and fetch its forecast in one step.
    pub async fn forecast_for_location(
        &self,
        name: &str,
        days: u32,
    ) -> Result<WeatherReport, WeatherError> {
        let coords = self.geocode(name).await?;
        let mut report = self.forecast(coords.latitude, coords.longitude, days).await?;
        report.location.name = Some(coords.name);
        report.location.country = coords.country;
        Ok(report)
    }
}

fn request_error(e: reqwest::Error) -> WeatherError {
    if e.is_timeout() {
        WeatherError::Timeout
    } else {
        WeatherError::Request {
            message: e.to_string(),
        }
    }
}

fn series_value<T: Copy>(series: &[Option<T>], index: usize) -> Option<T> {
    series.get(index).copied().flatten()
}

/// Human-readable label for a WMO weather interpretation code.
pub fn describe_weather_code(code: i32) -> String {
    let label = match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 => "fog",
        48 => "depositing rime fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "dense drizzle",
        61 => "slight rain",
        63 => "moderate rain",
        65 => "heavy rain",
        71 => "slight snowfall",
        73 => "moderate snowfall",
        75 => "heavy snowfall",
        77 => "snow grains",
        80 => "slight rain showers",
        81 => "moderate rain showers",
        82 => "violent rain showers",
        85 => "slight snow showers",
        86 => "heavy snow showers",
        95 => "thunderstorm",
        96 => "thunderstorm with slight hail",
        99 => "thunderstorm with heavy hail",
        other => return format!("code {other}"),
    };
    label.to_string()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    #[serde(default)]
    country: Option<String>,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    timezone: String,
    daily: DailySeries,
}

#[derive(Debug, Default, Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> WeatherClient {
        let base = server.uri();
        WeatherClient::new()
            .unwrap()
            .with_urls(format!("{base}/v1/forecast"), format!("{base}/v1/search"))
    }

    fn geocoding_body() -> serde_json::Value {
        serde_json::json!({
            "results": [{
                "name": "Kyoto",
                "country": "Japan",
                "latitude": 35.02107,
                "longitude": 135.75385
            }]
        })
    }

    fn forecast_body() -> serde_json::Value {
        serde_json::json!({
            "latitude": 35.0,
            "longitude": 135.75,
            "timezone": "Asia/Tokyo",
            "daily": {
                "time": ["2025-01-01", "2025-01-02"],
                "weather_code": [0, 61],
                "temperature_2m_max": [9.4, 7.1],
                "temperature_2m_min": [1.2, null],
                "precipitation_sum": [0.0, 4.5]
            }
        })
    }

    #[tokio::test]
    async fn geocode_resolves_the_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Kyoto"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(geocoding_body()))
            .expect(1)
            .mount(&server)
            .await;

        let coords = test_client(&server).geocode("Kyoto").await.unwrap();
        assert_eq!(coords.name, "Kyoto");
        assert_eq!(coords.country.as_deref(), Some("Japan"));
        assert!((coords.latitude - 35.02107).abs() < 1e-9);
    }

    #[tokio::test]
    async fn geocode_with_no_results_is_unknown_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let err = test_client(&server).geocode("Atlantis").await.unwrap_err();
        assert!(matches!(err, WeatherError::UnknownLocation { name } if name == "Atlantis"));
    }

    #[tokio::test]
    async fn forecast_zips_the_daily_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let report = test_client(&server).forecast(35.0, 135.75, 2).await.unwrap();
        assert_eq!(report.location.timezone, "Asia/Tokyo");
        assert_eq!(report.daily.len(), 2);

        let first = &report.daily[0];
        assert_eq!(first.date, "2025-01-01");
        assert_eq!(first.description, "clear sky");
        assert_eq!(first.temp_min, Some(1.2));

        let second = &report.daily[1];
        assert_eq!(second.description, "slight rain");
        assert_eq!(second.temp_min, None);
        assert_eq!(second.precipitation, Some(4.5));
    }

    #[tokio::test]
    async fn forecast_days_are_clamped_to_the_api_maximum() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("forecast_days", "16"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server).forecast(35.0, 135.75, 365).await.unwrap();
    }

    #[tokio::test]
    async fn forecast_for_location_carries_the_resolved_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(geocoding_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let report = test_client(&server)
            .forecast_for_location("Kyoto", 2)
            .await
            .unwrap();
        assert_eq!(report.location.name.as_deref(), Some("Kyoto"));
        assert_eq!(report.location.country.as_deref(), Some("Japan"));
        assert_eq!(report.daily.len(), 2);
    }

    #[tokio::test]
    async fn upstream_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = test_client(&server).geocode("Kyoto").await.unwrap_err();
        assert!(matches!(err, WeatherError::Api { status: 503 }));
    }

    #[test]
    fn weather_codes_have_labels() {
        assert_eq!(describe_weather_code(0), "clear sky");
        assert_eq!(describe_weather_code(95), "thunderstorm");
        assert_eq!(describe_weather_code(42), "code 42");
    }
}
