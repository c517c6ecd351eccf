//! Annotated result snapshots (`results/api_output_<ts>.jpg`)

use crate::imaging::{encode_jpeg, from_image, to_image};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use suntrack_core::{BoundingBox, Frame, TargetRegion, TrackedDetection};
use time::macros::format_description;
use time::OffsetDateTime;

const TARGET_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DETECTION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const LABEL_SCALE: f32 = 14.0;
const THICKNESS: i64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("frame buffer does not match its dimensions")]
    Buffer,
    #[error("encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unusable label font {0}")]
    Font(String),
}

/// Draws the target region and every tracked detection onto a copy of `frame`.
/// With a font, each detection also gets its `dx/dy` correction as a label.
pub fn annotate(
    frame: &Frame,
    region: &TargetRegion,
    detections: &[TrackedDetection],
    font: Option<&Font<'static>>,
) -> Result<Frame, SnapshotError> {
    let mut img = to_image(frame).ok_or(SnapshotError::Buffer)?;
    let (left, top) = region.top_left();
    let (right, bottom) = region.bottom_right();
    draw_box(&mut img, (left, top, right, bottom), TARGET_COLOR);

    for tracked in detections {
        let Some(corners) = pixel_corners(&tracked.detection.bbox) else {
            continue;
        };
        draw_box(&mut img, corners, DETECTION_COLOR);
        if let Some(font) = font {
            let (x1, y1, _, _) = clip(&img, corners);
            draw_text_mut(
                &mut img,
                LABEL_COLOR,
                (x1 + 5) as i32,
                (y1 - 16).max(0) as i32,
                Scale::uniform(LABEL_SCALE),
                font,
                &offset_label(tracked),
            );
        }
    }
    from_image(img).ok_or(SnapshotError::Buffer)
}

fn offset_label(tracked: &TrackedDetection) -> String {
    format!("dx: {:.1}, dy: {:.1}", tracked.dx, tracked.dy)
}

/// Rounded box corners, `None` for NaN or infinite coordinates
fn pixel_corners(b: &BoundingBox) -> Option<(i64, i64, i64, i64)> {
    let coords = [b.x1, b.y1, b.x2, b.y2];
    if !coords.iter().all(|v| v.is_finite()) {
        return None;
    }
    // clamped so the later i64 conversion cannot saturate
    let px = |v: f64| v.round().clamp(-1e9, 1e9) as i64;
    Some((
        px(b.x1.min(b.x2)),
        px(b.y1.min(b.y2)),
        px(b.x1.max(b.x2)),
        px(b.y1.max(b.y2)),
    ))
}

/// Pulls corners to at most `THICKNESS` pixels outside the frame
fn clip(img: &RgbImage, (x1, y1, x2, y2): (i64, i64, i64, i64)) -> (i64, i64, i64, i64) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let cx = |x: i64| x.clamp(-THICKNESS, w - 1 + THICKNESS);
    let cy = |y: i64| y.clamp(-THICKNESS, h - 1 + THICKNESS);
    (cx(x1), cy(y1), cx(x2), cy(y2))
}

fn draw_box(img: &mut RgbImage, corners: (i64, i64, i64, i64), color: Rgb<u8>) {
    let (x1, y1, x2, y2) = clip(img, corners);
    for t in 0..THICKNESS {
        let (w, h) = (x2 - x1 + 1 - 2 * t, y2 - y1 + 1 - 2 * t);
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at((x1 + t) as i32, (y1 + t) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Writes annotated frames under a results directory
#[derive(Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    font: Option<Arc<Font<'static>>>,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            font: None,
        }
    }

    /// Loads a TTF/OTF font used to label detections with their offset
    pub fn with_label_font(mut self, path: &Path) -> Result<Self, SnapshotError> {
        let bytes = std::fs::read(path)?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| SnapshotError::Font(path.display().to_string()))?;
        self.font = Some(Arc::new(font));
        Ok(self)
    }

    pub fn path_for(&self, at: OffsetDateTime) -> PathBuf {
        let stamp = at
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]"
            ))
            .unwrap_or_else(|_| at.unix_timestamp().to_string());
        self.dir.join(format!("api_output_{stamp}.jpg"))
    }

    pub async fn save(
        &self,
        frame: &Frame,
        region: &TargetRegion,
        detections: &[TrackedDetection],
        at: OffsetDateTime,
    ) -> Result<PathBuf, SnapshotError> {
        let annotated = annotate(frame, region, detections, self.font.as_deref())?;
        let bytes = encode_jpeg(&annotated)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(at);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
