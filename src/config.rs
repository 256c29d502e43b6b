use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{CameraConfig, FacingMode, IDEAL_HEIGHT, IDEAL_WIDTH};
use crate::encode::JPEG_QUALITY;
use crate::overlay::find_label_font;
use crate::scheduler::DETECTION_PERIOD;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_CAMERA_URL: &str = "stub://microscope";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    server_url: Option<String>,
    camera: Option<CameraConfigFile>,
    period_ms: Option<u64>,
    jpeg_quality: Option<f32>,
    overlay_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    ideal_width: Option<u32>,
    ideal_height: Option<u32>,
    facing: Option<FacingMode>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub server_url: String,
    pub camera: CameraConfig,
    pub period: Duration,
    pub jpeg_quality: f32,
    pub overlay_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Config file named by `SCOPE_CONFIG`, then `SCOPE_*` env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCOPE_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file in place of `SCOPE_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        Self {
            server_url: file
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            camera: CameraConfig {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                ideal_width: camera.ideal_width.unwrap_or(IDEAL_WIDTH),
                ideal_height: camera.ideal_height.unwrap_or(IDEAL_HEIGHT),
                facing: camera.facing.unwrap_or_default(),
            },
            period: file
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or(DETECTION_PERIOD),
            jpeg_quality: file.jpeg_quality.unwrap_or(JPEG_QUALITY),
            overlay_path: file.overlay_path,
            font_path: file.font_path.or_else(find_label_font),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SCOPE_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        if let Ok(url) = std::env::var("SCOPE_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(period) = std::env::var("SCOPE_PERIOD_MS") {
            let millis: u64 = period.trim().parse().map_err(|_| {
                anyhow!("SCOPE_PERIOD_MS must be an integer number of milliseconds")
            })?;
            self.period = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("SCOPE_OVERLAY_PATH") {
            if !path.trim().is_empty() {
                self.overlay_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SCOPE_FONT_PATH") {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Check ranges. The binary calls this again after applying CLI flags.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(anyhow!("detection period must be greater than zero"));
        }
        if !(self.jpeg_quality > 0.0 && self.jpeg_quality <= 1.0) {
            return Err(anyhow!(
                "jpeg quality must be in (0, 1], got {}",
                self.jpeg_quality
            ));
        }
        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            return Err(anyhow!("ideal camera resolution must be non-zero"));
        }
        let server = url::Url::parse(&self.server_url)
            .map_err(|e| anyhow!("invalid server url {}: {}", self.server_url, e))?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url must use http or https, got {}",
                server.scheme()
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.camera.url, DEFAULT_CAMERA_URL);
        assert_eq!(cfg.camera.ideal_width, 1280);
        assert_eq!(cfg.camera.ideal_height, 720);
        assert_eq!(cfg.camera.facing, FacingMode::Environment);
        assert_eq!(cfg.period, Duration::from_millis(2000));
        assert!(cfg.overlay_path.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = MonitorConfig::default();
        cfg.period = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.jpeg_quality = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.camera.ideal_height = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.server_url = "ftp://scope.local".into();
        assert!(cfg.validate().is_err());
    }
}
