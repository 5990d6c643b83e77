//! Weather lookup — the external data collaborator used by the intake flow.
//!
//! Wraps the Open-Meteo current-weather endpoint. Every call is bounded by
//! the configured timeout and any failure (transport, status, parse)
//! returns `None`; the calling handler turns that into an apologetic
//! failure result. Nothing here may raise into the dispatcher.

use serde::Deserialize;
use tracing::{debug, error};

/// Open-Meteo forecast endpoint.
const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Current weather at a location.
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherReport {
    pub temperature: f64,
    pub feels_like: f64,
    pub description: String,
    pub humidity: i64,
    pub wind_speed: f64,
}

impl WeatherReport {
    /// One spoken sentence describing the report.
    pub fn spoken(&self) -> String {
        format!(
            "The current weather is {} with a temperature of {:.1}°C (feels like {:.1}°C). \
             The humidity is {}% and wind speed is {:.1} meters per second.",
            self.description, self.temperature, self.feels_like, self.humidity, self.wind_speed
        )
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    current: ApiCurrent,
}

#[derive(Deserialize)]
struct ApiCurrent {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    apparent_temperature: f64,
    wind_speed_10m: f64,
    weather_code: i64,
}

/// Client for current-weather lookups.
pub struct WeatherLookup {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherLookup {
    /// Create a lookup client with a per-call timeout.
    pub fn new(timeout_secs: u64) -> Self {
        Self::with_base_url(OPEN_METEO_URL, timeout_secs)
    }

    /// Create a lookup client against a custom endpoint (tests).
    pub fn with_base_url(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        WeatherLookup {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch current weather for the given coordinates.
    ///
    /// Returns `None` on any failure.
    pub async fn current(&self, lat: f64, lon: f64) -> Option<WeatherReport> {
        debug!(lat = lat, lon = lon, "fetching weather");

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,apparent_temperature,wind_speed_10m,weather_code"
                        .to_string(),
                ),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "weather request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            error!(status = %response.status(), "weather API error");
            return None;
        }

        let data: ApiResponse = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to parse weather response");
                return None;
            }
        };

        let current = data.current;
        Some(WeatherReport {
            temperature: current.temperature_2m,
            feels_like: current.apparent_temperature,
            description: describe_weather_code(current.weather_code).to_string(),
            humidity: current.relative_humidity_2m as i64,
            wind_speed: current.wind_speed_10m,
        })
    }
}

/// Convert WMO weather codes to human-readable descriptions.
fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 => "foggy",
        48 => "depositing rime fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "dense drizzle",
        61 => "slight rain",
        63 => "moderate rain",
        65 => "heavy rain",
        71 => "slight snow",
        73 => "moderate snow",
        75 => "heavy snow",
        77 => "snow grains",
        80 => "slight rain showers",
        81 => "moderate rain showers",
        82 => "violent rain showers",
        85 => "slight snow showers",
        86 => "heavy snow showers",
        95 => "thunderstorm",
        96 => "thunderstorm with slight hail",
        99 => "thunderstorm with heavy hail",
        _ => "unknown weather condition",
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
