//! HTTP-backed lookup tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use codemode_core::config::WeatherConfig;
use codemode_core::{
    types::{ToolContext, ToolOutput},
    Error, Result,
};

use crate::builtin::parse_args;
use crate::registry::ToolEntry;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    /// City name to look up, e.g. "San Francisco" or "Tokyo"
    pub location: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    results: Option<Vec<GeoResult>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeoResult {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: String,
    #[serde(default)]
    admin1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: i64,
}

/// Current conditions for one resolved place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub wind_speed_kmh: f64,
    pub weather_code: i64,
}

fn display_name(geo: &GeoResult) -> String {
    match geo.admin1.as_deref().filter(|a| !a.is_empty()) {
        Some(admin1) => format!("{}, {}, {}", geo.name, admin1, geo.country),
        None => format!("{}, {}", geo.name, geo.country),
    }
}

/// Geocoding plus forecast lookups against Open-Meteo style endpoints.
pub struct WeatherClient {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            geocoding_url: config.geocoding_url.clone(),
            forecast_url: config.forecast_url.clone(),
        })
    }

    pub async fn current(&self, location: &str) -> Result<WeatherReport> {
        let geo_res = self
            .client
            .get(&self.geocoding_url)
            .query(&[
                ("name", location),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| Error::tool_execution(format!("Geocoding request failed: {}", e)))?;
        if !geo_res.status().is_success() {
            return Err(Error::tool_execution(format!(
                "Geocoding request failed: {}",
                geo_res.status().as_u16()
            )));
        }
        let geo: GeoResponse = geo_res
            .json()
            .await
            .map_err(|e| Error::tool_execution(format!("Invalid geocoding response: {}", e)))?;
        let place = geo
            .results
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| Error::tool_execution(format!("Location not found: \"{}\"", location)))?;

        let weather_res = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code".to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| Error::tool_execution(format!("Weather request failed: {}", e)))?;
        if !weather_res.status().is_success() {
            return Err(Error::tool_execution(format!(
                "Weather request failed: {}",
                weather_res.status().as_u16()
            )));
        }
        let forecast: ForecastResponse = weather_res
            .json()
            .await
            .map_err(|e| Error::tool_execution(format!("Invalid weather response: {}", e)))?;
        let c = forecast.current;

        tracing::debug!(location = %location, resolved = %place.name, "Weather lookup complete");
        Ok(WeatherReport {
            location: display_name(&place),
            latitude: place.latitude,
            longitude: place.longitude,
            temperature_celsius: c.temperature_2m,
            humidity_percent: c.relative_humidity_2m,
            wind_speed_kmh: c.wind_speed_10m,
            weather_code: c.weather_code,
        })
    }
}

/// `get_weather`, backed by `client`.
pub fn weather_tool(client: Arc<WeatherClient>) -> ToolEntry {
    ToolEntry::with_args::<WeatherArgs>(
        "get_weather",
        "Get current weather for any city. Returns temperature, humidity, wind speed, and weather condition code.",
        move |input: Value, _ctx: Arc<ToolContext>| {
            let client = client.clone();
            async move {
                let args: WeatherArgs = parse_args(input)?;
                let report = client.current(&args.location).await?;
                ToolOutput::json(&report)
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(admin1: Option<&str>) -> GeoResult {
        GeoResult {
            name: "Springfield".into(),
            latitude: 39.8,
            longitude: -89.6,
            country: "United States".into(),
            admin1: admin1.map(String::from),
        }
    }

    #[test]
    fn test_display_name_with_and_without_region() {
        assert_eq!(display_name(&geo(Some("Illinois"))), "Springfield, Illinois, United States");
        assert_eq!(display_name(&geo(None)), "Springfield, United States");
        assert_eq!(display_name(&geo(Some(""))), "Springfield, United States");
    }

    #[test]
    fn test_empty_geocoding_results() {
        let parsed: GeoResponse = serde_json::from_str(r#"{"generationtime_ms": 0.5}"#).unwrap();
        assert!(parsed.results.is_none());
    }
}
