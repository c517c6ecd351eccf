/**
 * PORTS - Contracts between the poll loop and its external collaborators
 *
 * RÔLE :
 * The kernel injects one implementation of each trait into the scheduler
 * service (camera, detector, weather, geolocation, audit sink). Tests inject
 * the doubles from suntrack-devkit.
 *
 * FAILURE CONTRACT :
 * - CaptureError / DetectError / WeatherError are transient: the loop logs,
 *   substitutes a safe default and keeps going
 * - GeolocationError is fatal at startup
 * - AuditError is always swallowed after logging
 */

use crate::models::{
    Detection, Frame, GeoLocation, HostMetrics, ModelRecord, ProgramRecord, WeatherSnapshot,
};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera could not be opened: {0}")]
    Open(String),
    #[error("no frame available: {0}")]
    NoFrame(String),
    #[error("frame could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("detector request failed: {0}")]
    Request(String),
    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("frame could not be encoded: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(String),
    #[error("weather response invalid: {0}")]
    InvalidResponse(String),
    #[error("weather API key missing")]
    MissingApiKey,
}

#[derive(Debug, thiserror::Error)]
pub enum GeolocationError {
    #[error("geolocation request failed: {0}")]
    Request(String),
    #[error("geolocation response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit record could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened camera. Must be released exactly once; callers wrap it in a guard.
#[async_trait]
pub trait CameraSession: Send {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the device. Synchronous so it can run from `Drop`.
    fn release(&mut self);
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CameraSession>, CaptureError>;

    fn describe(&self) -> String;
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(&self, location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError>;
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self) -> Result<GeoLocation, GeolocationError>;
}

/// Best-effort structured log of scheduling decisions and detections
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn program(&self, record: &ProgramRecord) -> Result<(), AuditError>;

    async fn model(&self, record: &ModelRecord) -> Result<(), AuditError>;

    fn name(&self) -> &str;
}

/// Samples host resource usage for model records
pub trait HostProbe: Send + Sync {
    fn sample(&self) -> HostMetrics;
}
