//! Camera frame sources.
//!
//! This module provides `CameraSource`, the live feed the detection loop
//! samples from:
//! - Synthetic feed (`stub://...`) for tests and demos
//! - HTTP MJPEG streams and JPEG snapshot endpoints (`http(s)://...`)
//!
//! Acquisition requests an ideal resolution, video only. The resolution the
//! source actually delivers is read back once by `open()` and from then on
//! sizes every downstream buffer and the overlay layer.
//!
//! A refused camera surfaces as `MonitorError::PermissionDenied`, which keeps
//! the detection loop from starting.

mod http;
mod synthetic;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::MonitorError;
use crate::frame::{Frame, Resolution};

use http::HttpCamera;
use synthetic::SyntheticCamera;

pub const IDEAL_WIDTH: u32 = 1280;
pub const IDEAL_HEIGHT: u32 = 720;

/// Which way the camera should face. Advisory, like the resolution hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Feed URL. Supported schemes: stub:// (synthetic), http(s):// (MJPEG or JPEG).
    pub url: String,
    /// Ideal width; the source may deliver something else.
    pub ideal_width: u32,
    /// Ideal height; the source may deliver something else.
    pub ideal_height: u32,
    pub facing: FacingMode,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://microscope".to_string(),
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
            facing: FacingMode::Environment,
        }
    }
}

/// Live camera feed.
pub struct CameraSource {
    backend: CameraBackend,
    resolution: Option<Resolution>,
    opened_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    released: bool,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    Http(HttpCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let backend = if config.url.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            let url = Url::parse(&config.url).context("parse camera url")?;
            match url.scheme() {
                "http" | "https" => CameraBackend::Http(HttpCamera::new(config)),
                other => {
                    return Err(anyhow!(
                        "unsupported camera scheme '{}'; expected stub, http or https",
                        other
                    ))
                }
            }
        };
        Ok(Self {
            backend,
            resolution: None,
            opened_at: None,
            last_frame_at: None,
            frame_count: 0,
            released: false,
        })
    }

    /// Start the feed and read back the negotiated resolution.
    ///
    /// Returns `MonitorError::PermissionDenied` (inside the `anyhow` chain)
    /// when the camera refuses access.
    pub fn open(&mut self) -> Result<Resolution> {
        let resolution = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.open(),
            CameraBackend::Http(camera) => camera.open(),
        }?;
        if resolution.width == 0 || resolution.height == 0 {
            return Err(anyhow!("camera negotiated empty resolution {}", resolution));
        }
        self.resolution = Some(resolution);
        self.opened_at = Some(Instant::now());
        self.released = false;
        Ok(resolution)
    }

    /// Resolution negotiated by `open()`, if the camera has been started.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Grab the current frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if self.released {
            return Err(anyhow!("camera has been released"));
        }
        if self.resolution.is_none() {
            return Err(anyhow!("camera not opened; call open() first"));
        }
        let frame = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            CameraBackend::Http(camera) => camera.next_frame(),
        }?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    /// Stop the feed. Further `next_frame` calls fail until `open()` is called again.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            CameraBackend::Http(camera) => camera.release(),
        }
        self.released = true;
        log::info!("camera released after {} frames", self.frame_count);
    }

    pub fn is_healthy(&self) -> bool {
        if self.released {
            return false;
        }
        let Some(opened_at) = self.opened_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= Duration::from_secs(10),
            None => opened_at.elapsed() <= Duration::from_secs(10),
        }
    }

    pub fn stats(&self) -> CameraStats {
        let source = match &self.backend {
            CameraBackend::Synthetic(camera) => camera.url().to_string(),
            CameraBackend::Http(camera) => camera.url().to_string(),
        };
        CameraStats {
            frames_captured: self.frame_count,
            source,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

pub(crate) fn permission_denied(detail: impl Into<String>) -> anyhow::Error {
    MonitorError::PermissionDenied(detail.into()).into()
}
