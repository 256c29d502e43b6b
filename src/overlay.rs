//! Detection overlay.
//!
//! `OverlayRenderer` turns a cycle's boxes into drawing calls on a `Surface`:
//! a transparent layer the size of the video, cleared at the start of every
//! render. Boxes arrive center-based and are drawn corner-based, each with a
//! solid label tab sitting on top of the box.
//!
//! `RasterLayer` is the production surface (imageproc over an RGBA buffer).

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::client::DetectionBox;
use crate::frame::{Frame, Resolution};
use crate::reconcile::display_percent;

pub const BOX_COLOR: Rgba<u8> = Rgba([0x00, 0xFF, 0x00, 0xFF]);
pub const TEXT_COLOR: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xFF]);
pub const LINE_WIDTH: f32 = 3.0;
pub const LABEL_HEIGHT: f32 = 25.0;
pub const LABEL_PADDING: f32 = 10.0;
pub const TEXT_INSET_X: f32 = 5.0;
/// Label baseline sits this far above the box top.
pub const TEXT_BASELINE_OFFSET: f32 = 7.0;
pub const FONT_PX: f32 = 16.0;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
/// Advance used to size label tabs when no font is loaded.
const FALLBACK_ADVANCE_PX: f32 = 9.0;
/// Rects are clipped to the layer grown by this much on every side, which
/// keeps off-layer edges of a stroked box off the layer.
const CLIP_MARGIN: f32 = 8.0;

/// Fonts tried, in order, when no label font is configured.
pub const LABEL_FONT_CANDIDATES: [&str; 8] = [
    "assets/font/label.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// First existing entry of `LABEL_FONT_CANDIDATES`.
pub fn find_label_font() -> Option<PathBuf> {
    LABEL_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Axis-aligned rectangle in layer pixels, top-left origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// 2D drawing target for the overlay.
pub trait Surface {
    fn size(&self) -> Resolution;

    /// Erase everything to fully transparent.
    fn clear(&mut self);

    /// Stroke the outline of `rect`, `line_width` pixels wide, centered on the edge.
    fn stroke_rect(&mut self, rect: RectF, line_width: f32, color: Rgba<u8>);

    fn fill_rect(&mut self, rect: RectF, color: Rgba<u8>);

    /// Width in pixels `text` would occupy.
    fn measure_text(&self, text: &str) -> f32;

    /// Draw `text` with its left edge at `x` and its baseline at `baseline_y`.
    fn fill_text(&mut self, text: &str, x: f32, baseline_y: f32, color: Rgba<u8>);
}

/// Convert a center-based box to its corner-based rectangle.
pub fn box_rect(b: &DetectionBox) -> RectF {
    RectF::new(
        b.center_x - b.width / 2.0,
        b.center_y - b.height / 2.0,
        b.width,
        b.height,
    )
}

/// Label text, e.g. `"RBC: 91%"`. Same rounding as the statistics panel.
pub fn box_label(b: &DetectionBox) -> String {
    format!(
        "{}: {}%",
        b.class,
        display_percent(b.confidence as f64 * 100.0)
    )
}

pub struct OverlayRenderer<S: Surface> {
    surface: S,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Replace the previous drawing with `boxes`, in input order.
    ///
    /// The layer is cleared even when `boxes` is empty, so a cycle with no
    /// detections erases the previous cycle's boxes.
    pub fn render(&mut self, boxes: &[DetectionBox]) {
        self.surface.clear();
        if boxes.is_empty() {
            return;
        }

        for b in boxes {
            let rect = box_rect(b);
            if !rect.is_finite() {
                log::debug!("skipping {} box with non-finite geometry", b.class);
                continue;
            }
            self.surface.stroke_rect(rect, LINE_WIDTH, BOX_COLOR);

            let label = box_label(b);
            let text_width = self.surface.measure_text(&label);
            self.surface.fill_rect(
                RectF::new(
                    rect.x,
                    rect.y - LABEL_HEIGHT,
                    text_width + LABEL_PADDING,
                    LABEL_HEIGHT,
                ),
                BOX_COLOR,
            );
            self.surface.fill_text(
                &label,
                rect.x + TEXT_INSET_X,
                rect.y - TEXT_BASELINE_OFFSET,
                TEXT_COLOR,
            );
        }
    }

    /// Remove every drawing without rendering anything new.
    pub fn clear(&mut self) {
        self.surface.clear();
    }
}

/// Transparent RGBA layer aligned to the video's pixel dimensions.
pub struct RasterLayer {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RasterLayer {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            image: RgbaImage::from_pixel(resolution.width, resolution.height, TRANSPARENT),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(self.with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// True when no pixel has been drawn since the last clear.
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    /// Blend the layer over `frame`.
    pub fn composite(&self, frame: &Frame) -> Result<RgbaImage> {
        let mut base = image::DynamicImage::ImageRgb8(frame.to_image()?).into_rgba8();
        imageops::overlay(&mut base, &self.image, 0, 0);
        Ok(base)
    }

    /// Composite over `frame` and write a PNG.
    pub fn save_composite(&self, frame: &Frame, path: &Path) -> Result<()> {
        self.composite(frame)?
            .save(path)
            .with_context(|| format!("write overlay {}", path.display()))
    }

    /// Clip `rect` to the layer plus `CLIP_MARGIN`.
    ///
    /// `None` for non-finite or empty geometry and for rects entirely off
    /// the layer, so the pixel rect never overflows `i32`.
    fn to_pixel_rect(&self, rect: RectF) -> Option<Rect> {
        if !rect.is_finite() {
            return None;
        }
        let size = self.size();
        let (layer_w, layer_h) = (size.width as f32, size.height as f32);
        let left = rect.x.round().max(-CLIP_MARGIN);
        let top = rect.y.round().max(-CLIP_MARGIN);
        let right = (rect.x + rect.width).round().min(layer_w + CLIP_MARGIN);
        let bottom = (rect.y + rect.height).round().min(layer_h + CLIP_MARGIN);
        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }
        if right <= 0.0 || bottom <= 0.0 || left >= layer_w || top >= layer_h {
            return None;
        }
        let (width, height) = ((right - left) as u32, (bottom - top) as u32);
        Some(Rect::at(left as i32, top as i32).of_size(width, height))
    }
}

impl Surface for RasterLayer {
    fn size(&self) -> Resolution {
        let (width, height) = self.image.dimensions();
        Resolution::new(width, height)
    }

    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    fn stroke_rect(&mut self, rect: RectF, line_width: f32, color: Rgba<u8>) {
        let passes = line_width.round().max(1.0) as i32;
        let first = -(passes / 2);
        for offset in first..first + passes {
            let grown = offset as f32;
            let ring = RectF::new(
                rect.x - grown,
                rect.y - grown,
                rect.width + 2.0 * grown,
                rect.height + 2.0 * grown,
            );
            if let Some(r) = self.to_pixel_rect(ring) {
                draw_hollow_rect_mut(&mut self.image, r, color);
            }
        }
    }

    fn fill_rect(&mut self, rect: RectF, color: Rgba<u8>) {
        if let Some(r) = self.to_pixel_rect(rect) {
            draw_filled_rect_mut(&mut self.image, r, color);
        }
    }

    fn measure_text(&self, text: &str) -> f32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(FONT_PX), font, text).0 as f32,
            None => text.chars().count() as f32 * FALLBACK_ADVANCE_PX,
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline_y: f32, color: Rgba<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(FONT_PX);
        let top = baseline_y - font.as_scaled(scale).ascent();
        let width = self.measure_text(text);
        let (layer_w, layer_h) = (self.image.width() as f32, self.image.height() as f32);
        if !(x.is_finite() && top.is_finite()) {
            return;
        }
        if x + width <= 0.0 || x >= layer_w || top + 2.0 * FONT_PX <= 0.0 || top >= layer_h {
            return;
        }
        draw_text_mut(
            &mut self.image,
            color,
            x.round() as i32,
            top.round() as i32,
            scale,
            font,
            text,
        );
    }
}
