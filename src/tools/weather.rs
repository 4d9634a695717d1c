//! Current weather via the Open-Meteo forecast endpoint, located through
//! the GeoIp plugin.

use serde::Deserialize;
use serde_json::{Value, json};

use super::geoip::GeoIpPlugin;
use super::{FunctionSpec, ToolError};

const FORECAST_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: i32,
}

/// Spoken-friendly rendering of the WMO weather code groups.
fn describe_weather_code(code: i32) -> &'static str {
    match code {
        0 => "clear sky",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unsettled",
    }
}

pub struct WeatherPlugin {
    http: reqwest::Client,
    endpoint: String,
    geo: GeoIpPlugin,
}

impl Default for WeatherPlugin {
    fn default() -> Self {
        Self::new(FORECAST_ENDPOINT, GeoIpPlugin::default())
    }
}

impl WeatherPlugin {
    pub fn new(endpoint: impl Into<String>, geo: GeoIpPlugin) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            geo,
        }
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![FunctionSpec {
            name: "CurrentWeather",
            description: "Get the current weather at the device's location",
            parameters: json!({ "type": "object", "properties": {} }),
        }]
    }

    pub async fn invoke(&self, function: &str, _args: &Value) -> Result<Value, ToolError> {
        match function {
            "CurrentWeather" => {
                let location = self.geo.locate().await?;
                let response: ForecastResponse = self
                    .http
                    .get(&self.endpoint)
                    .query(&[
                        ("latitude", location.lat.to_string()),
                        ("longitude", location.lon.to_string()),
                        ("current_weather", "true".to_string()),
                        ("hourly", "temperature_2m".to_string()),
                    ])
                    .send()
                    .await
                    .map_err(|e| ToolError::Failed(format!("weather lookup failed: {e}")))?
                    .json()
                    .await
                    .map_err(|e| ToolError::Failed(format!("weather response malformed: {e}")))?;

                Ok(json!({
                    "location": location.city,
                    "temperatureCelsius": response.current_weather.temperature,
                    "windSpeedKmh": response.current_weather.windspeed,
                    "conditions": describe_weather_code(response.current_weather.weathercode),
                }))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_code_groups() {
        assert_eq!(describe_weather_code(0), "clear sky");
        assert_eq!(describe_weather_code(2), "partly cloudy");
        assert_eq!(describe_weather_code(63), "rain");
        assert_eq!(describe_weather_code(96), "thunderstorm");
        assert_eq!(describe_weather_code(42), "unsettled");
    }

    #[test]
    fn test_forecast_response_parses() {
        let response: ForecastResponse = serde_json::from_str(
            r#"{"current_weather":{"temperature":18.3,"windspeed":11.0,"weathercode":2}}"#,
        )
        .unwrap();
        assert!((response.current_weather.temperature - 18.3).abs() < 1e-9);
    }
}
