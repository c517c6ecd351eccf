//! Sun filter applied to every frame before detection
//!
//! Contrast gain on all channels, then in HSV space: brightness offset on the
//! value channel, saturation boost, and threshold-to-zero on value. Dim sky
//! goes black while the solar disc stays bright.

use crate::config::FilterConf;
use suntrack_core::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct SunFilter {
    alpha: f32,
    beta: f32,
    saturation_boost: f32,
    value_threshold: u8,
}

impl SunFilter {
    pub fn new(conf: &FilterConf) -> Self {
        Self {
            alpha: conf.alpha,
            beta: conf.beta,
            saturation_boost: conf.saturation_boost,
            value_threshold: conf.value_threshold,
        }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let mut pixels = frame.pixels().to_vec();
        for px in pixels.chunks_exact_mut(3) {
            let rgb = [
                saturate(px[0] as f32 * self.alpha),
                saturate(px[1] as f32 * self.alpha),
                saturate(px[2] as f32 * self.alpha),
            ];
            let (h, s, v) = rgb_to_hsv(rgb);
            let v = saturate(v + self.beta);
            let s = saturate(s * self.saturation_boost);
            let v = if v > self.value_threshold as f32 { v } else { 0.0 };
            px.copy_from_slice(&hsv_to_rgb(h, s, v));
        }
        Frame::from_rgb8(frame.width(), frame.height(), pixels).unwrap_or_else(|| frame.clone())
    }
}

/// Absolute value rounded and clamped into 0..=255
fn saturate(x: f32) -> f32 {
    x.abs().round().min(255.0)
}

/// Hue in degrees, saturation and value on a 0..=255 scale
fn rgb_to_hsv([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let v = v / 255.0;
    let s = s / 255.0;
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 % 6 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [
        ((r + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}
