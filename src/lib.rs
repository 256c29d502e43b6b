//! Live microscope-feed detection monitor.
//!
//! The crate samples frames from a camera feed on a fixed period, ships each
//! frame to a remote detection service and renders what comes back: bounding
//! boxes on a transparent overlay layer and a per-class statistics panel.
//!
//! # Cycle
//!
//! One cycle is capture → encode → send → render. At most one cycle is in
//! flight at any time; a tick that arrives while a cycle is running is
//! dropped, never queued.
//!
//! # Module Structure
//!
//! - `camera`: Frame sources (synthetic, HTTP MJPEG/JPEG)
//! - `encode`: Fixed-size rasterization + JPEG compression
//! - `client`: Remote detection service (`/classes`, `/detect`)
//! - `catalog`: Ordered class catalog with a built-in fallback
//! - `overlay`: Box/label drawing on a transparent layer
//! - `reconcile`: Per-class statistics panel model
//! - `scheduler`: Loop state machine, cycle guard, periodic driver
//! - `session`: The controller that ties one cycle together
//! - `ui`: Terminal status line and statistics panel
//! - `config`: File + environment configuration

pub mod camera;
pub mod catalog;
pub mod client;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod ui;

pub use camera::{CameraConfig, CameraSource, FacingMode};
pub use catalog::{ClassCatalog, DEFAULT_CLASSES};
pub use client::{
    ClassStats, DetectionBox, DetectionResult, DetectionService, HttpDetectionClient,
};
pub use config::MonitorConfig;
pub use encode::{EncodedImage, FrameEncoder, JPEG_QUALITY};
pub use error::MonitorError;
pub use frame::{Frame, Resolution};
pub use overlay::{OverlayRenderer, RasterLayer, Surface};
pub use reconcile::{ResultPanel, ResultRow};
pub use scheduler::{
    run_loop, Cycle, CycleDispatcher, CycleGuard, CyclePermit, Dispatch, LoopScheduler,
    LoopState, Trigger, DETECTION_PERIOD,
};
pub use session::{PanelView, Session, SessionOptions, SessionStats};
pub use ui::{PanelDisplay, Status, Ui, UiMode};
