//! Offset geometry between a detected sun and the on-screen target region
//!
//! The target region is the "correctly aimed" rectangle centered in the frame.
//! The offset is the smallest displacement that brings a point into it, which
//! is what the actuator needs to correct.

use crate::models::{Detection, TrackedDetection};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("target side must be at least 2 px, got {0}")]
    SideTooSmall(u32),
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("degenerate target region ({left},{top})-({right},{bottom})")]
    Degenerate {
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned target rectangle, inclusive bounds.
///
/// Invariant: `left < right` and `top < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegion {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

impl TargetRegion {
    pub fn new(top_left: (i64, i64), bottom_right: (i64, i64)) -> Result<Self, GeometryError> {
        let (left, top) = top_left;
        let (right, bottom) = bottom_right;
        if left >= right || top >= bottom {
            return Err(GeometryError::Degenerate {
                left,
                top,
                right,
                bottom,
            });
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Square of `side` pixels centered on a `width` x `height` frame
    pub fn centered(width: u32, height: u32, side: u32) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyFrame { width, height });
        }
        if side < 2 {
            return Err(GeometryError::SideTooSmall(side));
        }
        let cx = i64::from(width / 2);
        let cy = i64::from(height / 2);
        let half = i64::from(side / 2);
        Self::new((cx - half, cy - half), (cx + half, cy + half))
    }

    pub fn top_left(&self) -> (i64, i64) {
        (self.left, self.top)
    }

    pub fn bottom_right(&self) -> (i64, i64) {
        (self.right, self.bottom)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left as f64
            && p.x <= self.right as f64
            && p.y >= self.top as f64
            && p.y <= self.bottom as f64
    }

    /// Nearest point on or inside the region
    pub fn clamp(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.left as f64, self.right as f64),
            p.y.clamp(self.top as f64, self.bottom as f64),
        )
    }
}

/// Signed displacement of `center` from the target region.
///
/// `(0, 0)` iff the point is inside or on the boundary. Positive dx means the
/// sun is right of the target, positive dy means it is below.
pub fn offset(center: Point, region: &TargetRegion) -> (f64, f64) {
    let clamped = region.clamp(center);
    (center.x - clamped.x, center.y - clamped.y)
}

/// Keeps sun detections and attaches the correction for each one
pub fn track(detections: &[Detection], region: &TargetRegion) -> Vec<TrackedDetection> {
    detections
        .iter()
        .filter(|d| d.is_sun())
        .map(|d| {
            let (dx, dy) = offset(d.bbox.center(), region);
            TrackedDetection {
                detection: d.clone(),
                dx,
                dy,
            }
        })
        .collect()
}
