//! Frame rasterization and compression.
//!
//! `FrameEncoder` owns a capture buffer sized to the resolution negotiated at
//! camera start. Every frame is drawn into that buffer (scaled if the feed
//! ever delivers a different size) and compressed to JPEG at a fixed quality.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::{Frame, Resolution};

/// JPEG quality on the 0..=1 scale.
pub const JPEG_QUALITY: f32 = 0.9;

/// Filename used for the multipart upload.
pub const FRAME_FILENAME: &str = "frame.jpg";

pub const JPEG_MIME: &str = "image/jpeg";

/// A compressed frame ready to send.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn filename(&self) -> &'static str {
        FRAME_FILENAME
    }

    pub fn mime(&self) -> &'static str {
        JPEG_MIME
    }
}

pub struct FrameEncoder {
    buffer: RgbImage,
    quality: u8,
}

impl FrameEncoder {
    /// Encoder at the default quality (0.9).
    pub fn new(resolution: Resolution) -> Result<Self> {
        Self::with_quality(resolution, JPEG_QUALITY)
    }

    pub fn with_quality(resolution: Resolution, quality: f32) -> Result<Self> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(anyhow!("capture buffer must be non-empty, got {}", resolution));
        }
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(anyhow!("jpeg quality must be in (0, 1], got {}", quality));
        }
        Ok(Self {
            buffer: RgbImage::new(resolution.width, resolution.height),
            quality: (quality * 100.0).round().clamp(1.0, 100.0) as u8,
        })
    }

    pub fn resolution(&self) -> Resolution {
        let (width, height) = self.buffer.dimensions();
        Resolution::new(width, height)
    }

    /// JPEG quality on the encoder's 1..=100 scale.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Draw `frame` into the capture buffer and compress it.
    pub fn encode(&mut self, frame: &Frame) -> Result<EncodedImage> {
        self.rasterize(frame)?;
        let mut bytes = Vec::with_capacity(self.buffer.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode_image(&self.buffer)
            .context("jpeg encode")?;
        let (width, height) = self.buffer.dimensions();
        Ok(EncodedImage {
            bytes,
            width,
            height,
        })
    }

    fn rasterize(&mut self, frame: &Frame) -> Result<()> {
        let target = self.resolution();
        if frame.resolution() == target {
            self.buffer.copy_from_slice(frame.pixels());
            return Ok(());
        }
        log::debug!(
            "frame {} differs from capture buffer {}; scaling",
            frame.resolution(),
            target
        );
        let source = frame.to_image()?;
        self.buffer = imageops::resize(&source, target.width, target.height, FilterType::Triangle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::from_image(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    #[test]
    fn encodes_jpeg_at_buffer_size() -> Result<()> {
        let mut encoder = FrameEncoder::new(Resolution::new(32, 24))?;
        assert_eq!(encoder.quality(), 90);

        let encoded = encoder.encode(&solid_frame(32, 24, [10, 200, 30]))?;
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.width, encoded.height), (32, 24));
        assert_eq!(encoded.filename(), "frame.jpg");

        let decoded = image::load_from_memory(&encoded.bytes)?;
        assert_eq!(decoded.dimensions(), (32, 24));
        Ok(())
    }

    #[test]
    fn scales_off_size_frames_into_the_fixed_buffer() -> Result<()> {
        let mut encoder = FrameEncoder::new(Resolution::new(16, 8))?;
        let encoded = encoder.encode(&solid_frame(64, 32, [0, 0, 255]))?;
        assert_eq!((encoded.width, encoded.height), (16, 8));
        assert_eq!(encoder.resolution(), Resolution::new(16, 8));
        Ok(())
    }

    #[test]
    fn rejects_bad_quality_and_empty_buffer() {
        assert!(FrameEncoder::with_quality(Resolution::new(4, 4), 0.0).is_err());
        assert!(FrameEncoder::with_quality(Resolution::new(4, 4), 1.5).is_err());
        assert!(FrameEncoder::new(Resolution::new(0, 4)).is_err());
    }
}
