//! Monitoring session.
//!
//! `Session` owns everything one detection cycle touches: the camera, the
//! capture encoder, the detection service, the statistics panel and the
//! overlay layer. It is created once the camera has negotiated its
//! resolution and lives until shutdown.
//!
//! The panel and the overlay are only written from `run_cycle`, and the
//! cycle guard keeps that to one thread at a time. They still sit behind
//! mutexes so a display thread can read them.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::camera::CameraSource;
use crate::catalog::ClassCatalog;
use crate::client::DetectionService;
use crate::encode::{FrameEncoder, JPEG_QUALITY};
use crate::error::MonitorError;
use crate::frame::Resolution;
use crate::overlay::{find_label_font, OverlayRenderer, RasterLayer};
use crate::reconcile::ResultPanel;
use crate::scheduler::Cycle;

/// Receives the panel after every successful reconcile.
pub trait PanelView: Send + Sync {
    fn update(&self, panel: &ResultPanel);
}

impl<T: PanelView + ?Sized> PanelView for Arc<T> {
    fn update(&self, panel: &ResultPanel) {
        (**self).update(panel)
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub jpeg_quality: f32,
    /// Font for box labels; without one, label tabs are drawn without text.
    /// Defaults to the first installed font from `LABEL_FONT_CANDIDATES`.
    pub font_path: Option<PathBuf>,
    /// When set, every successful cycle writes frame + overlay here as PNG.
    pub overlay_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: JPEG_QUALITY,
            font_path: find_label_font(),
            overlay_path: None,
        }
    }
}

/// Cycle counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles_ok: u64,
    pub cycles_failed: u64,
}

pub struct Session {
    catalog: ClassCatalog,
    resolution: Resolution,
    camera: Mutex<CameraSource>,
    encoder: Mutex<FrameEncoder>,
    service: Arc<dyn DetectionService>,
    panel: Mutex<ResultPanel>,
    overlay: Mutex<OverlayRenderer<RasterLayer>>,
    overlay_path: Option<PathBuf>,
    view: Option<Box<dyn PanelView>>,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
}

impl Session {
    /// Build a session around an opened camera.
    pub fn new(
        catalog: ClassCatalog,
        camera: CameraSource,
        service: Arc<dyn DetectionService>,
        options: SessionOptions,
    ) -> Result<Self> {
        let resolution = camera
            .resolution()
            .ok_or_else(|| anyhow!("camera must be opened before building a session"))?;
        let encoder = FrameEncoder::with_quality(resolution, options.jpeg_quality)?;
        let mut layer = RasterLayer::new(resolution);
        if let Some(path) = &options.font_path {
            layer = layer.with_font_file(path)?;
        }
        if !layer.has_font() {
            log::warn!("no label font found; boxes will be drawn without label text");
        }
        let panel = ResultPanel::new(&catalog);

        Ok(Self {
            catalog,
            resolution,
            camera: Mutex::new(camera),
            encoder: Mutex::new(encoder),
            service,
            panel: Mutex::new(panel),
            overlay: Mutex::new(OverlayRenderer::new(layer)),
            overlay_path: options.overlay_path,
            view: None,
            cycles_ok: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
        })
    }

    pub fn with_view(mut self, view: Box<dyn PanelView>) -> Self {
        view.update(&ResultPanel::new(&self.catalog));
        self.view = Some(view);
        self
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn panel(&self) -> Result<ResultPanel> {
        let panel = self
            .panel
            .lock()
            .map_err(|_| anyhow!("result panel lock poisoned"))?;
        Ok(panel.clone())
    }

    /// Run `f` against the overlay layer.
    pub fn with_overlay<T>(&self, f: impl FnOnce(&RasterLayer) -> T) -> Result<T> {
        let overlay = self.lock_overlay();
        Ok(f(overlay.surface()))
    }

    /// A cycle that panicked mid-render leaves the layer half drawn, so a
    /// poisoned overlay is cleared and reused.
    fn lock_overlay(&self) -> MutexGuard<'_, OverlayRenderer<RasterLayer>> {
        self.overlay.lock().unwrap_or_else(|poisoned| {
            log::warn!("overlay lock poisoned by an earlier cycle; clearing layer");
            let mut overlay = poisoned.into_inner();
            overlay.clear();
            self.overlay.clear_poison();
            overlay
        })
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }

    /// Release the camera. In-flight cycles fail at their next capture.
    pub fn shutdown(&self) -> Result<()> {
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| anyhow!("camera lock poisoned"))?;
        let stats = camera.stats();
        camera.release();
        log::info!(
            "session closed: {} frames from {}",
            stats.frames_captured,
            stats.source
        );
        Ok(())
    }

    fn execute(&self) -> Result<()> {
        let frame = {
            let mut camera = self
                .camera
                .lock()
                .map_err(|_| anyhow!("camera lock poisoned"))?;
            if !camera.is_healthy() {
                log::warn!("camera has not delivered a frame recently");
            }
            camera.next_frame().context("capture frame")?
        };

        let image = {
            let mut encoder = self
                .encoder
                .lock()
                .map_err(|_| anyhow!("encoder lock poisoned"))?;
            encoder.encode(&frame)?
        };

        let (stats, boxes) = match self.service.detect(&image).into_cycle_result() {
            Ok(result) => result,
            Err(e) => {
                log::warn!("detection failed: {}", e);
                return Err(e.into());
            }
        };

        {
            let mut panel = self
                .panel
                .lock()
                .map_err(|_| anyhow!("result panel lock poisoned"))?;
            panel.reconcile(&stats);
            if let Some(view) = &self.view {
                view.update(&panel);
            }
        }

        let mut overlay = self.lock_overlay();
        overlay.render(&boxes);
        log::debug!(
            "cycle rendered {} boxes, {} classes detected",
            boxes.len(),
            stats.len()
        );
        if let Some(path) = &self.overlay_path {
            if let Err(e) = overlay.surface().save_composite(&frame, path) {
                log::warn!("overlay write failed: {:#}", e);
            }
        }
        Ok(())
    }
}

impl Cycle for Session {
    fn run_cycle(&self) -> Result<()> {
        let result = self.execute();
        match &result {
            Ok(()) => {
                self.cycles_ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.cycles_failed.fetch_add(1, Ordering::Relaxed);
                // Detection failures were already logged at warn.
                if !matches!(e.downcast_ref(), Some(MonitorError::CycleFailed(_))) {
                    log::error!("detection cycle failed: {:#}", e);
                }
            }
        }
        result
    }
}
