/*!
Builders for weather snapshots and detections

Defaults describe a clear midday over a 640x480 frame, so a test only
spells out the fields it cares about.
*/

use suntrack_core::models::{BoundingBox, Detection, WeatherSnapshot, SUN_CLASS_ID};
use time::OffsetDateTime;

/// Builds a `WeatherSnapshot` relative to a reference instant
#[derive(Debug, Clone)]
pub struct WeatherBuilder {
    snapshot: WeatherSnapshot,
}

impl WeatherBuilder {
    /// Clear sky, sunrise six hours before `now`, sunset six hours after
    pub fn clear_day(now: i64) -> Self {
        Self {
            snapshot: WeatherSnapshot {
                condition: "Clear".to_string(),
                description: "clear sky".to_string(),
                temperature: 293.15,
                cloud_coverage_pct: 0,
                wind_speed: 2.0,
                sunrise: now - 6 * 3600,
                sunset: now + 6 * 3600,
                captured_at: OffsetDateTime::from_unix_timestamp(now)
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            },
        }
    }

    /// Sun set two hours ago, next sunrise in `until_sunrise` seconds (assuming a one-day cycle)
    pub fn night(now: i64, until_sunrise: i64) -> Self {
        let sunrise = now + until_sunrise - 86_400;
        Self::clear_day(now).sunrise(sunrise).sunset(now - 2 * 3600)
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.snapshot.condition = condition.to_string();
        self.snapshot.description = condition.to_lowercase();
        self
    }

    pub fn clouds(mut self, pct: u8) -> Self {
        self.snapshot.cloud_coverage_pct = pct;
        self
    }

    pub fn sunrise(mut self, epoch: i64) -> Self {
        self.snapshot.sunrise = epoch;
        self
    }

    pub fn sunset(mut self, epoch: i64) -> Self {
        self.snapshot.sunset = epoch;
        self
    }

    pub fn build(self) -> WeatherSnapshot {
        self.snapshot
    }
}

/// Builds a `Detection`; defaults to a confident sun detection
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    detection: Detection,
}

impl DetectionBuilder {
    /// Square sun box of side `size` centered on (`cx`, `cy`)
    pub fn sun_at(cx: f64, cy: f64, size: f64) -> Self {
        Self {
            detection: Detection {
                bbox: BoundingBox::from_center(cx, cy, size, size),
                confidence: 0.9,
                class_id: SUN_CLASS_ID,
            },
        }
    }

    pub fn class(mut self, class_id: u32) -> Self {
        self.detection.class_id = class_id;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.detection.confidence = confidence;
        self
    }

    pub fn build(self) -> Detection {
        self.detection
    }
}
