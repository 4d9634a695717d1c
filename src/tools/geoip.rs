//! Device geolocation via the ip-api.com JSON endpoint.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{FunctionSpec, ToolError};

const GEO_ENDPOINT: &str = "http://ip-api.com/json";

#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocation {
    pub status: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub timezone: String,
}

pub struct GeoIpPlugin {
    http: reqwest::Client,
    endpoint: String,
}

impl Default for GeoIpPlugin {
    fn default() -> Self {
        Self::new(GEO_ENDPOINT)
    }
}

impl GeoIpPlugin {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Locate the device by its public IP. Shared with the weather plugin.
    pub async fn locate(&self) -> Result<GeoLocation, ToolError> {
        let location: GeoLocation = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("geo lookup failed: {e}")))?
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("geo lookup returned bad JSON: {e}")))?;

        // The endpoint reports failures in-band.
        if location.status != "success" {
            return Err(ToolError::Failed(format!(
                "geo lookup status: {}",
                location.status
            )));
        }
        Ok(location)
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![FunctionSpec {
            name: "LocateDevice",
            description: "Find the device's approximate location (city, country, coordinates) from its network address",
            parameters: json!({ "type": "object", "properties": {} }),
        }]
    }

    pub async fn invoke(&self, function: &str, _args: &Value) -> Result<Value, ToolError> {
        match function {
            "LocateDevice" => {
                let location = self.locate().await?;
                Ok(json!({
                    "city": location.city,
                    "country": location.country,
                    "latitude": location.lat,
                    "longitude": location.lon,
                    "timezone": location.timezone,
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
    fn test_failure_status_is_detected() {
        let location: GeoLocation =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(location.status, "fail");
    }

    #[test]
    fn test_success_payload_parses() {
        let location: GeoLocation = serde_json::from_str(
            r#"{"status":"success","country":"Germany","city":"Berlin","lat":52.52,"lon":13.4,"timezone":"Europe/Berlin"}"#,
        )
        .unwrap();
        assert_eq!(location.city, "Berlin");
        assert!((location.lat - 52.52).abs() < 1e-9);
    }
}
