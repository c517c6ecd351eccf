//! IP geolocation (ipinfo-style JSON), queried once at startup

use crate::config::GeolocationConf;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use suntrack_core::ports::{GeolocationError, Geolocator};
use suntrack_core::GeoLocation;

#[derive(Debug, Deserialize)]
struct IpInfo {
    loc: String,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

fn parse_ipinfo(body: &str) -> Result<GeoLocation, GeolocationError> {
    let info: IpInfo =
        serde_json::from_str(body).map_err(|e| GeolocationError::InvalidResponse(e.to_string()))?;
    let (lat, lon) = info
        .loc
        .split_once(',')
        .ok_or_else(|| GeolocationError::InvalidResponse(format!("bad loc {:?}", info.loc)))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| GeolocationError::InvalidResponse(format!("bad coordinate {v:?}: {e}")))
    };
    Ok(GeoLocation {
        latitude: parse(lat)?,
        longitude: parse(lon)?,
        city: info.city,
        region: info.region,
        country: info.country,
    })
}

pub struct IpInfoLocator {
    client: reqwest::Client,
    url: String,
}

impl IpInfoLocator {
    pub fn new(conf: &GeolocationConf) -> Result<Self, GeolocationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .build()
            .map_err(|e| GeolocationError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: conf.url.clone(),
        })
    }
}

#[async_trait]
impl Geolocator for IpInfoLocator {
    async fn locate(&self) -> Result<GeoLocation, GeolocationError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GeolocationError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GeolocationError::Request(format!("HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| GeolocationError::InvalidResponse(e.to_string()))?;
        parse_ipinfo(&body)
    }
}
