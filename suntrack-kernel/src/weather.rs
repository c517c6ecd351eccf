//! OpenWeatherMap current-weather client

use crate::config::WeatherConf;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use suntrack_core::ports::{WeatherError, WeatherProvider};
use suntrack_core::{GeoLocation, WeatherSnapshot};
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: OwmMain,
    #[serde(default)]
    clouds: OwmClouds,
    #[serde(default)]
    wind: OwmWind,
    sys: OwmSys,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwmClouds {
    #[serde(default)]
    all: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    sunrise: i64,
    sunset: i64,
}

fn into_snapshot(body: &str, captured_at: OffsetDateTime) -> Result<WeatherSnapshot, WeatherError> {
    let resp: OwmResponse =
        serde_json::from_str(body).map_err(|e| WeatherError::InvalidResponse(e.to_string()))?;
    let condition = resp
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| WeatherError::InvalidResponse("empty weather list".into()))?;
    Ok(WeatherSnapshot {
        condition: condition.main,
        description: condition.description,
        temperature: resp.main.temp,
        cloud_coverage_pct: resp.clouds.all.round().clamp(0.0, 100.0) as u8,
        wind_speed: resp.wind.speed,
        sunrise: resp.sys.sunrise,
        sunset: resp.sys.sunset,
        captured_at,
    })
}

pub struct OpenWeatherMap {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl OpenWeatherMap {
    pub fn new(conf: &WeatherConf, api_key: Option<String>) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .build()
            .map_err(|e| WeatherError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: conf.url.clone(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    async fn fetch(&self, location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;
        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WeatherError::Request(format!("HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| WeatherError::InvalidResponse(e.to_string()))?;
        let snapshot = into_snapshot(&body, OffsetDateTime::now_utc())?;
        debug!(
            "weather for {}: {} with {}% clouds",
            location.label(),
            snapshot.condition,
            snapshot.cloud_coverage_pct
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const SAMPLE: &str = r#"{
        "coord": {"lon": -122.4194, "lat": 37.7749},
        "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
        "main": {"temp": 289.5, "humidity": 70},
        "wind": {"speed": 4.6, "deg": 270},
        "clouds": {"all": 75},
        "sys": {"sunrise": 1718973000, "sunset": 1719026000},
        "name": "San Francisco"
    }"#;

    #[test]
    fn test_maps_openweathermap_fields() {
        let at = datetime!(2024-06-21 16:00 UTC);
        let snap = into_snapshot(SAMPLE, at).unwrap();
        assert_eq!(snap.condition, "Clouds");
        assert_eq!(snap.description, "broken clouds");
        assert_eq!(snap.cloud_coverage_pct, 75);
        assert_eq!(snap.temperature, 289.5);
        assert_eq!(snap.wind_speed, 4.6);
        assert_eq!(snap.sunrise, 1_718_973_000);
        assert_eq!(snap.sunset, 1_719_026_000);
        assert_eq!(snap.captured_at, at);
    }

    #[test]
    fn test_empty_weather_list_is_invalid() {
        let body = r#"{"weather": [], "main": {"temp": 280.0}, "sys": {"sunrise": 1, "sunset": 2}}"#;
        let err = into_snapshot(body, OffsetDateTime::UNIX_EPOCH).unwrap_err();
        assert!(matches!(err, WeatherError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let provider = OpenWeatherMap::new(&WeatherConf::default(), None).unwrap();
        let err = provider
            .fetch(&GeoLocation::new(37.7749, -122.4194))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::MissingApiKey));
    }
}
