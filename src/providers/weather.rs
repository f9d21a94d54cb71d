//! Current-conditions source backed by the Yandex Weather forecast API.

use super::{read_json, ProviderError};
use crate::types::{Coordinates, WeatherReport};
use serde_json::Value;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "weather API";

/// Header carrying the upstream credential.
const KEY_HEADER: &str = "X-Yandex-Weather-Key";

/// Client for the upstream weather API.
#[derive(Debug, Clone)]
pub struct WeatherSource {
    api_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl WeatherSource {
    /// `api_key` must already be sanitized; `None` means unconfigured.
    pub fn new(api_url: &str, api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key,
            http,
        }
    }

    /// Validate raw coordinates and fetch the conditions there.
    pub async fn report(
        &self,
        latitude: Option<&Value>,
        longitude: Option<&Value>,
    ) -> Result<WeatherReport, ProviderError> {
        let coords = validate_coordinates(latitude, longitude)?;
        self.fetch(coords).await
    }

    /// Fetch conditions for already-validated coordinates.
    pub async fn fetch(&self, coords: Coordinates) -> Result<WeatherReport, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            error!("Weather API key is not configured");
            ProviderError::Config(
                "weather API key is not configured (set YANDEX_WEATHER_API_KEY)".into(),
            )
        })?;

        info!(
            "Requesting weather for lat={}, lon={}",
            coords.latitude, coords.longitude
        );

        let resp = self
            .http
            .get(&self.api_url)
            .header(KEY_HEADER, api_key)
            .query(&[("lat", coords.latitude), ("lon", coords.longitude)])
            .send()
            .await
            .map_err(|e| {
                error!("Weather API request failed: {}", e);
                ProviderError::from_reqwest(SERVICE, e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Weather API returned {}: {}", status, body);
            let message = match status.as_u16() {
                403 => "weather API denied access (403): check YANDEX_WEATHER_API_KEY".to_string(),
                401 => "weather API rejected the credential (401): invalid API key".to_string(),
                code => format!("weather API returned status {code}"),
            };
            return Err(ProviderError::Upstream {
                message,
                status: status.as_u16(),
                body,
            });
        }

        let body = read_json(SERVICE, resp).await?;
        debug!("Weather API body: {}", body);
        extract_report(&body)
    }
}

/// Check presence, numeric form and range of both axes, in that order.
pub fn validate_coordinates(
    latitude: Option<&Value>,
    longitude: Option<&Value>,
) -> Result<Coordinates, ProviderError> {
    let (Some(lat), Some(lon)) = (present(latitude), present(longitude)) else {
        warn!("Weather request without coordinates");
        return Err(ProviderError::Validation("missing coordinates".into()));
    };

    let (Some(latitude), Some(longitude)) = (as_number(lat), as_number(lon)) else {
        warn!("Non-numeric coordinates: lat={}, lon={}", lat, lon);
        return Err(ProviderError::Validation(
            "coordinates must be numeric".into(),
        ));
    };

    if !(-90.0..=90.0).contains(&latitude) {
        warn!("Latitude out of range: {}", latitude);
        return Err(ProviderError::Validation(
            "latitude must be between -90 and 90".into(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        warn!("Longitude out of range: {}", longitude);
        return Err(ProviderError::Validation(
            "longitude must be between -180 and 180".into(),
        ));
    }

    Ok(Coordinates {
        latitude,
        longitude,
    })
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read conditions from `fact`, falling back to `forecasts[0].parts.day`.
pub fn extract_report(body: &Value) -> Result<WeatherReport, ProviderError> {
    let fact = body
        .get("fact")
        .filter(|f| f.as_object().is_some_and(|o| !o.is_empty()))
        .or_else(|| {
            warn!("No 'fact' in weather response, trying forecasts[0].parts.day");
            body.pointer("/forecasts/0/parts/day")
        });

    let field = |key: &str| {
        fact.and_then(|f| f.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    };

    let report = WeatherReport {
        temperature: field("temp"),
        condition: field("condition"),
        wind_speed: field("wind_speed"),
        humidity: field("humidity"),
    };

    if report.is_empty() {
        error!("Could not extract weather fields from response");
        return Err(ProviderError::Extraction {
            service: SERVICE,
            what: "weather data",
            raw: body.clone(),
        });
    }

    Ok(report)
}
