//! Captured frame container.
//!
//! - `Resolution`: The size negotiated with the camera at start time.
//! - `Frame`: One RGB8 frame as produced by a `CameraSource`.
//!
//! Frames are ephemeral: a cycle captures one, encodes it, optionally
//! composites the overlay onto it, then drops it.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::fmt;

/// Native frame size, read back from the camera after it starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes in a packed RGB8 frame of this size.
    pub fn rgb_len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One captured RGB8 frame.
pub struct Frame {
    /// Packed RGB8 pixels, row-major, no padding.
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Build a frame, checking that the pixel buffer matches the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = Resolution::new(width, height).rgb_len()?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Copy the frame into an `RgbImage`.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4).unwrap();
        assert_eq!(frame.resolution(), Resolution::new(4, 4));
    }

    #[test]
    fn resolution_displays_as_w_by_h() {
        assert_eq!(Resolution::new(1280, 720).to_string(), "1280x720");
    }
}
