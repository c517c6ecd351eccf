/**
 * DETECTORS - Object detection backends reached over HTTP
 *
 * BACKENDS :
 * - remote : hosted inference (Roboflow-style), base64 JPEG body, boxes as
 *            center + size, API key from ROBOFLOW_API_KEY
 * - local  : YOLO inference server fronting a model file, boxes as corners.
 *            A missing model file disables detection entirely.
 *
 * Both drop predictions under the configured confidence. Every request is
 * bounded by `detector.timeout_secs`.
 */

use crate::config::{DetectorBackend, DetectorConf};
use crate::imaging::encode_jpeg;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use suntrack_core::ports::{DetectError, Detector};
use suntrack_core::{BoundingBox, Detection, Frame};
use tracing::{debug, info, warn};

/// Builds the configured detector; `None` means detection is unavailable
pub fn build_detector(conf: &DetectorConf, api_key: Option<String>) -> Option<Arc<dyn Detector>> {
    let timeout = Duration::from_secs(conf.timeout_secs);
    match conf.backend {
        DetectorBackend::None => {
            info!("detector disabled by configuration");
            None
        }
        DetectorBackend::Remote => {
            let Some(key) = api_key.filter(|k| !k.is_empty()) else {
                warn!("ROBOFLOW_API_KEY not set, detection disabled");
                return None;
            };
            match RemoteDetector::new(&conf.url, &conf.model_id, key, conf.confidence, timeout) {
                Ok(d) => Some(Arc::new(d)),
                Err(e) => {
                    warn!("remote detector unavailable: {e}");
                    None
                }
            }
        }
        DetectorBackend::Local => {
            if !conf.model_path.exists() {
                warn!(
                    "model file not found: {}, detection disabled",
                    conf.model_path.display()
                );
                return None;
            }
            match LocalDetector::new(&conf.url, conf.model_path.clone(), conf.confidence, timeout) {
                Ok(d) => Some(Arc::new(d)),
                Err(e) => {
                    warn!("local detector unavailable: {e}");
                    None
                }
            }
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, DetectError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DetectError::Request(e.to_string()))
}

fn encode_base64(frame: &Frame) -> Result<String, DetectError> {
    let jpeg = encode_jpeg(frame).map_err(|e| DetectError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(jpeg))
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    predictions: Vec<RemotePrediction>,
}

#[derive(Debug, Deserialize)]
struct RemotePrediction {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    confidence: f32,
    #[serde(default)]
    class_id: u32,
}

pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    min_confidence: f32,
}

impl RemoteDetector {
    pub fn new(
        base_url: &str,
        model_id: &str,
        api_key: String,
        min_confidence: f32,
        timeout: Duration,
    ) -> Result<Self, DetectError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), model_id),
            api_key,
            min_confidence,
        })
    }
}

fn parse_remote(body: &str, min_confidence: f32) -> Result<Vec<Detection>, DetectError> {
    let resp: RemoteResponse =
        serde_json::from_str(body).map_err(|e| DetectError::InvalidResponse(e.to_string()))?;
    Ok(resp
        .predictions
        .into_iter()
        .filter(|p| p.confidence >= min_confidence)
        .map(|p| Detection {
            bbox: BoundingBox::from_center(p.x, p.y, p.width, p.height),
            confidence: p.confidence,
            class_id: p.class_id,
        })
        .collect())
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let body = encode_base64(frame)?;
        let confidence = format!("{:.0}", self.min_confidence * 100.0);
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("confidence", confidence.as_str()),
            ])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| DetectError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DetectError::Request(format!("HTTP {}", resp.status())));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| DetectError::InvalidResponse(e.to_string()))?;
        let detections = parse_remote(&text, self.min_confidence)?;
        debug!("remote detector returned {} boxes", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[derive(Debug, Deserialize)]
struct LocalResponse {
    #[serde(default)]
    detections: Vec<LocalBox>,
}

#[derive(Debug, Deserialize)]
struct LocalBox {
    xyxy: [f64; 4],
    confidence: f32,
    class_id: u32,
}

pub struct LocalDetector {
    client: reqwest::Client,
    url: String,
    model_path: PathBuf,
    min_confidence: f32,
}

impl LocalDetector {
    pub fn new(
        url: &str,
        model_path: PathBuf,
        min_confidence: f32,
        timeout: Duration,
    ) -> Result<Self, DetectError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.to_string(),
            model_path,
            min_confidence,
        })
    }
}

fn parse_local(body: &str, min_confidence: f32) -> Result<Vec<Detection>, DetectError> {
    let resp: LocalResponse =
        serde_json::from_str(body).map_err(|e| DetectError::InvalidResponse(e.to_string()))?;
    Ok(resp
        .detections
        .into_iter()
        .filter(|b| b.confidence >= min_confidence)
        .map(|b| Detection {
            bbox: BoundingBox::from(b.xyxy),
            confidence: b.confidence,
            class_id: b.class_id,
        })
        .collect())
}

#[async_trait]
impl Detector for LocalDetector {
    async fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let payload = serde_json::json!({
            "image": encode_base64(frame)?,
            "model": self.model_path.display().to_string(),
            "conf": self.min_confidence,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DetectError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DetectError::Request(format!("HTTP {}", resp.status())));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| DetectError::InvalidResponse(e.to_string()))?;
        parse_local(&text, self.min_confidence)
    }

    fn name(&self) -> &str {
        "local"
    }
}
