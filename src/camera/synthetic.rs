use anyhow::Result;
use rand::Rng;

use super::{permission_denied, CameraConfig};
use crate::frame::{Frame, Resolution};

const DENIED_URL: &str = "stub://denied";

/// Synthetic feed: a slide-like background with a few drifting blobs.
pub(super) struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    pub(super) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    pub(super) fn url(&self) -> &str {
        &self.config.url
    }

    /// Synthetic feeds always deliver the ideal resolution.
    pub(super) fn open(&mut self) -> Result<Resolution> {
        if self.config.url == DENIED_URL {
            return Err(permission_denied("synthetic camera refused access"));
        }
        log::info!(
            "camera: connected to {} (synthetic, facing={})",
            self.config.url,
            self.config.facing.as_str()
        );
        Ok(Resolution::new(
            self.config.ideal_width,
            self.config.ideal_height,
        ))
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels()?;
        Frame::new(pixels, self.config.ideal_width, self.config.ideal_height)
    }

    pub(super) fn release(&mut self) {
        log::debug!("camera: synthetic feed {} stopped", self.config.url);
    }

    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let width = self.config.ideal_width as usize;
        let height = self.config.ideal_height as usize;
        let resolution = Resolution::new(self.config.ideal_width, self.config.ideal_height);
        let mut pixels = vec![0u8; resolution.rgb_len()?];

        // Pale pink background, like a stained smear.
        for px in pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&[236, 214, 222]);
        }

        let mut rng = rand::thread_rng();
        let radius = (width.min(height) / 12).max(1);
        for blob in 0..3u64 {
            let phase = self.frame_count.wrapping_mul(7).wrapping_add(blob * 97);
            let cx = (phase as usize * 13) % width.max(1);
            let cy = (phase as usize * 5 + blob as usize * height / 3) % height.max(1);
            let shade: u8 = rng.gen_range(120..170);
            for y in cy.saturating_sub(radius)..(cy + radius).min(height) {
                for x in cx.saturating_sub(radius)..(cx + radius).min(width) {
                    let dx = x.abs_diff(cx);
                    let dy = y.abs_diff(cy);
                    if dx * dx + dy * dy <= radius * radius {
                        let idx = (y * width + x) * 3;
                        pixels[idx..idx + 3].copy_from_slice(&[shade, 40, 60]);
                    }
                }
            }
        }

        Ok(pixels)
    }
}
