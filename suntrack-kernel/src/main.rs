/**
 * SUNTRACK KERNEL - Entry point of the sun tracking service
 *
 * RÔLE : Wires config, collaborators (camera, detector, weather, audit),
 * the scheduler service and the HTTP control API.
 *
 * STARTUP : a failed geolocation aborts; a missing model or audit backend only
 * disables that capability and the process keeps running.
 */

mod annotate;
mod audit;
mod camera;
mod config;
mod detector;
mod filter;
mod geolocation;
mod health;
mod http;
mod imaging;
mod metrics;
mod service;
mod state;
mod weather;

use crate::annotate::SnapshotWriter;
use crate::audit::build_audit_sink;
use crate::camera::build_camera;
use crate::config::{load_config, KernelConfig, ResultsConf};
use crate::detector::build_detector;
use crate::filter::SunFilter;
use crate::geolocation::IpInfoLocator;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::metrics::SysinfoProbe;
use crate::service::{Collaborators, SchedulerService, ServiceOptions};
use crate::weather::OpenWeatherMap;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use suntrack_core::ports::Geolocator;
use suntrack_core::{GeoLocation, SunCalc};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Fixed coordinates from config win; otherwise the geolocator must answer
async fn resolve_location(cfg: &KernelConfig, locator: &dyn Geolocator) -> Result<GeoLocation> {
    if let Some(fixed) = &cfg.location {
        info!("📍 using configured location {}, {}", fixed.latitude, fixed.longitude);
        return Ok(GeoLocation::new(fixed.latitude, fixed.longitude));
    }
    let location = locator
        .locate()
        .await
        .with_context(|| format!("geolocation via {} failed", cfg.geolocation.url))?;
    info!(
        "📍 located at {} ({}, {})",
        location.label(),
        location.latitude,
        location.longitude
    );
    Ok(location)
}

fn snapshot_writer(cfg: &ResultsConf) -> Option<SnapshotWriter> {
    if !cfg.save_annotated {
        return None;
    }
    let writer = SnapshotWriter::new(&cfg.directory);
    let Some(font) = &cfg.label_font else {
        return Some(writer);
    };
    match writer.clone().with_label_font(font) {
        Ok(labelled) => Some(labelled),
        Err(e) => {
            warn!("⚠️ {e}, snapshots will have no offset labels");
            Some(writer)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("suntrack_kernel=info,suntrack_core=info")),
        )
        .init();

    let cfg = load_config().await;
    let locator = IpInfoLocator::new(&cfg.geolocation).context("geolocation client")?;
    let location = resolve_location(&cfg, &locator).await?;

    let camera = build_camera(&cfg.camera).context("camera source")?;
    let detector = build_detector(&cfg.detector, std::env::var("ROBOFLOW_API_KEY").ok());
    if detector.is_none() {
        warn!("⚠️ no detection model loaded, the camera cannot be started");
    }
    let weather = OpenWeatherMap::new(&cfg.weather, std::env::var("WEATHER_API_KEY").ok())
        .context("weather client")?;
    let audit = build_audit_sink(&cfg.audit).await;
    let health_tracker = HealthTracker::new(audit.name());

    let options = ServiceOptions {
        target_side: cfg.camera.target_side,
        retry_delay: Duration::from_millis(cfg.camera.retry_delay_ms),
        filter: cfg.filter.enabled.then(|| SunFilter::new(&cfg.filter)),
        snapshots: snapshot_writer(&cfg.results),
    };

    let service = SchedulerService::new(
        cfg.scheduler.clone(),
        location,
        Collaborators {
            camera,
            detector,
            weather: Arc::new(weather),
            ephemeris: Arc::new(SunCalc),
            audit,
            probe: Arc::new(SysinfoProbe::new()),
        },
        options,
        health_tracker.clone(),
    );

    let app = http::build_router(AppState {
        service,
        health_tracker,
    });

    let listener = TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    info!("🚀 suntrack kernel listening on http://{}", cfg.server.bind);
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationConf;
    use suntrack_devkit::{StaticGeolocator, TestHarness};

    #[tokio::test]
    async fn test_configured_location_skips_geolocation() {
        let cfg = KernelConfig {
            location: Some(LocationConf {
                latitude: 51.5,
                longitude: -0.12,
            }),
            ..KernelConfig::default()
        };
        let location = resolve_location(&cfg, &StaticGeolocator::unreachable())
            .await
            .unwrap();
        assert_eq!((location.latitude, location.longitude), (51.5, -0.12));
    }

    #[tokio::test]
    async fn test_geolocated_when_not_configured() {
        let harness = TestHarness::new();
        let location = resolve_location(&KernelConfig::default(), harness.geolocator.as_ref())
            .await
            .unwrap();
        assert_eq!(location, harness.location);
    }

    #[tokio::test]
    async fn test_geolocation_failure_aborts_startup() {
        let err = resolve_location(&KernelConfig::default(), &StaticGeolocator::unreachable())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("geolocation via"));
    }

    #[test]
    fn test_snapshot_writer_degrades_without_font() {
        let dir = tempfile::tempdir().unwrap();
        let mut results = ResultsConf {
            directory: dir.path().to_path_buf(),
            ..ResultsConf::default()
        };
        assert!(snapshot_writer(&results).is_none());

        results.save_annotated = true;
        results.label_font = Some(dir.path().join("missing.ttf"));
        assert!(snapshot_writer(&results).is_some());
    }
}
