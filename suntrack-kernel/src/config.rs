use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use suntrack_core::SchedulerConfig;
use tokio::fs;
use tracing::warn;

/// Whole kernel configuration, read from `$SUNTRACK_CONFIG` (default `suntrack.yaml`).
/// Every section is optional; secrets never live here, only in the environment.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    /// Fixed coordinates; when absent the geolocator is queried at startup
    pub location: Option<LocationConf>,
    pub geolocation: GeolocationConf,
    pub weather: WeatherConf,
    pub scheduler: SchedulerConfig,
    pub camera: CameraConf,
    pub detector: DetectorConf,
    pub filter: FilterConf,
    pub audit: AuditConf,
    pub results: ResultsConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub bind: String,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocationConf {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeolocationConf {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for GeolocationConf {
    fn default() -> Self {
        Self {
            url: "https://ipinfo.io/json".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConf {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConf {
    fn default() -> Self {
        Self {
            url: "https://api.openweathermap.org/data/2.5/weather".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraSourceKind {
    /// JPEG stills fetched from `url`
    Snapshot,
    /// Image files replayed in a loop from `directory`
    Directory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConf {
    pub source: CameraSourceKind,
    pub url: String,
    pub directory: PathBuf,
    pub timeout_secs: u64,
    /// Wait after a failed read before trying again
    pub retry_delay_ms: u64,
    /// Side of the centered target square, in pixels
    pub target_side: u32,
}

impl Default for CameraConf {
    fn default() -> Self {
        Self {
            source: CameraSourceKind::Snapshot,
            url: "http://localhost:8081/snapshot.jpg".into(),
            directory: PathBuf::from("frames"),
            timeout_secs: 5,
            retry_delay_ms: 1000,
            target_side: 50,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// Hosted inference endpoint, center-format boxes
    Remote,
    /// Local YOLO inference server fronting a model file, corner-format boxes
    Local,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorConf {
    pub backend: DetectorBackend,
    pub url: String,
    pub model_id: String,
    pub model_path: PathBuf,
    pub confidence: f32,
    pub timeout_secs: u64,
}

impl Default for DetectorConf {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Local,
            url: "http://localhost:9001/predict".into(),
            model_id: "sun-tracking-555mn/4".into(),
            model_path: PathBuf::from("models/best.pt"),
            confidence: 0.3,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConf {
    pub enabled: bool,
    /// Contrast gain applied to every channel
    pub alpha: f32,
    /// Brightness offset added to the value channel
    pub beta: f32,
    pub saturation_boost: f32,
    /// Value below this is zeroed
    pub value_threshold: u8,
}

impl Default for FilterConf {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 1.2,
            beta: 0.0,
            saturation_boost: 2.0,
            value_threshold: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    Mqtt,
    File,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuditConf {
    pub sink: AuditSinkKind,
    pub mqtt: MqttConf,
    /// Directory of the JSON-lines files for the `file` sink
    pub directory: PathBuf,
}

impl Default for AuditConf {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::File,
            mqtt: MqttConf::default(),
            directory: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic_prefix: "suntrack".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ResultsConf {
    /// Write an annotated JPEG after each processed frame
    pub save_annotated: bool,
    pub directory: PathBuf,
    /// TTF font for the dx/dy labels; boxes only when unset
    pub label_font: Option<PathBuf>,
}

impl Default for ResultsConf {
    fn default() -> Self {
        Self {
            save_annotated: false,
            directory: PathBuf::from("results"),
            label_font: None,
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("SUNTRACK_CONFIG").unwrap_or_else(|_| "suntrack.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        warn!("no config at {}, using defaults", path.display());
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("invalid config {}: {e}, using defaults", path.display());
        KernelConfig::default()
    })
}
