use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ToolContract, ToolExecutor};
use crate::config::WeatherConfig;
use crate::constants::{WEATHER_FORECAST_URL, WEATHER_GEOCODING_URL};

pub const NAME: &str = "getWeatherInformation";

/// Looks up current conditions through the Open-Meteo API.
pub struct WeatherTool {
    client: reqwest::Client,
    forecast_url: String,
    geocoding_url: String,
}

impl WeatherTool {
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            forecast_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| WEATHER_FORECAST_URL.to_string()),
            geocoding_url: config
                .geocoding_url
                .clone()
                .unwrap_or_else(|| WEATHER_GEOCODING_URL.to_string()),
        }
    }

    async fn locate(&self, city: &str) -> Result<Place> {
        let response: GeocodingResponse = self
            .client
            .get(format!("{}/v1/search", self.geocoding_url))
            .query(&[("name", city), ("count", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Invalid geocoding response")?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No location found for '{}'", city))
    }
}

#[derive(Deserialize)]
struct WeatherInput {
    city: String,
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: Current,
}

#[derive(Deserialize)]
struct Current {
    temperature_2m: f64,
    wind_speed_10m: Option<f64>,
    weather_code: Option<u32>,
}

/// Fetching weather calls an external service, so each call is confirmed
/// by the user first.
pub fn contract(config: &WeatherConfig) -> ToolContract {
    ToolContract::new(
        NAME,
        "Show the current weather for a given city.",
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "Name of the city"
                }
            },
            "required": ["city"]
        }),
    )
    .with_executor(WeatherTool::new(config))
    .requiring_confirmation()
}

#[async_trait::async_trait]
impl ToolExecutor for WeatherTool {
    async fn execute(&self, args: Value) -> Result<Value> {
        let input: WeatherInput = serde_json::from_value(args)?;
        let place = self.locate(&input.city).await?;

        let latitude = place.latitude.to_string();
        let longitude = place.longitude.to_string();
        let forecast: ForecastResponse = self
            .client
            .get(format!("{}/v1/forecast", self.forecast_url))
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", "temperature_2m,wind_speed_10m,weather_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Invalid forecast response")?;

        Ok(json!({
            "city": place.name,
            "tempC": forecast.current.temperature_2m,
            "windKmh": forecast.current.wind_speed_10m,
            "weatherCode": forecast.current.weather_code,
        }))
    }
}
