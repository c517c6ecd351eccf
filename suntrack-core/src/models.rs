//! Domain records shared by the scheduler, the kernel adapters and the audit log
//!
//! Timestamps are `OffsetDateTime` serialized as RFC 3339; epoch-second fields
//! (`sunrise`, `next_interval_time`) stay plain integers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Class id the detectors use for the sun
pub const SUN_CLASS_ID: u32 = 0;

/// Observer position, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: None,
            region: None,
            country: None,
        }
    }

    /// "San Francisco, California, US" or the raw coordinates when unlabeled
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            format!("{:.4},{:.4}", self.latitude, self.longitude)
        } else {
            parts.join(", ")
        }
    }
}

/// Weather observation used by the weather-based poll policy.
///
/// Field names on the wire match the documents the dashboard already reads
/// (`weather_condition`, `clouds`, ...). A snapshot is always replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    #[serde(rename = "weather_condition")]
    pub condition: String,
    #[serde(rename = "weather_description", default)]
    pub description: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(rename = "clouds")]
    pub cloud_coverage_pct: u8,
    #[serde(default)]
    pub wind_speed: f64,
    /// Epoch seconds
    pub sunrise: i64,
    /// Epoch seconds
    pub sunset: i64,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

/// Axis-aligned box in pixel coordinates, serialized as `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from a center point and its size (hosted inference format)
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    pub fn center(&self) -> crate::geometry::Point {
        crate::geometry::Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One object reported by a detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn is_sun(&self) -> bool {
        self.class_id == SUN_CLASS_ID
    }
}

/// A sun detection with the correction needed to bring it into the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(rename = "distance_x")]
    pub dx: f64,
    #[serde(rename = "distance_y")]
    pub dy: f64,
}

/// Decoded RGB8 camera frame
#[derive(Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wraps an RGB8 buffer; `None` when the buffer does not match the size
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Black frame, mostly useful for tests
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Host resource usage attached to every model record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
}

/// Audit record written each time the poll interval is decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub weather_response: Option<WeatherSnapshot>,
    pub interval_formula: String,
    /// Epoch seconds of the next scheduled poll
    pub next_interval_time: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub detections: Vec<TrackedDetection>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Audit record written after each processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_details: ModelDetails,
    pub raspberry_details: HostMetrics,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
