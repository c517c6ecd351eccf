//! Conversions between `Frame` and the `image` crate

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageError, RgbImage};
use suntrack_core::ports::CaptureError;
use suntrack_core::Frame;

pub const JPEG_QUALITY: u8 = 85;

pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CaptureError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CaptureError::Decode(e.to_string()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Frame::from_rgb8(width, height, img.into_raw())
        .ok_or_else(|| CaptureError::Decode(format!("empty image {width}x{height}")))
}

pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
        frame.pixels(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

pub fn to_image(frame: &Frame) -> Option<RgbImage> {
    RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
}

pub fn from_image(img: RgbImage) -> Option<Frame> {
    let (width, height) = img.dimensions();
    Frame::from_rgb8(width, height, img.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_keeps_dimensions() {
        let frame = Frame::blank(32, 24);
        let bytes = encode_jpeg(&frame).unwrap();
        let back = decode_frame(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (32, 24));
    }

    #[test]
    fn test_garbage_does_not_decode() {
        let err = decode_frame(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CaptureError::Decode(_)));
    }
}
