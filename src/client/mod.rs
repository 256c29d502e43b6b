//! Remote detection service client.
//!
//! The service is an opaque collaborator with two endpoints:
//! - `GET /classes`: ordered list of class names
//! - `POST /detect`: one multipart field `image` (`frame.jpg`), answers with
//!   per-class statistics and boxes
//!
//! One request per call. No retries, no timeout beyond the transport default.

mod multipart;
pub mod wire;

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::Read;
use url::Url;

use crate::encode::EncodedImage;
use crate::error::MonitorError;

pub use multipart::MultipartBody;
pub use wire::{parse_class_list, parse_detect_response};

const MAX_RESPONSE_BYTES: u64 = 8 * 1024 * 1024;

/// Name of the multipart field carrying the frame.
pub const IMAGE_FIELD: &str = "image";

/// Aggregate statistics for one detected class in one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassStats {
    /// Average confidence, 0..=100.
    pub avg_confidence: f64,
}

/// One reported object, center-based, in source-frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub class: String,
    /// 0..=1
    pub confidence: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Outcome of one `/detect` call.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionResult {
    Success {
        stats: HashMap<String, ClassStats>,
        boxes: Vec<DetectionBox>,
    },
    Failure {
        reason: String,
    },
}

impl DetectionResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        DetectionResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DetectionResult::Failure { .. })
    }

    /// Convert a failure into the `CycleFailed` error kind.
    pub fn into_cycle_result(
        self,
    ) -> std::result::Result<(HashMap<String, ClassStats>, Vec<DetectionBox>), MonitorError> {
        match self {
            DetectionResult::Success { stats, boxes } => Ok((stats, boxes)),
            DetectionResult::Failure { reason } => Err(MonitorError::CycleFailed(reason)),
        }
    }
}

/// Detection service seam.
///
/// `HttpDetectionClient` is the production implementation; tests script their own.
pub trait DetectionService: Send + Sync {
    /// Service identifier for logs.
    fn name(&self) -> &str;

    /// Fetch the class catalog. Errors carry `MonitorError::CatalogFetchFailed`.
    fn fetch_classes(&self) -> Result<Vec<String>>;

    /// Send one compressed frame. Never errors: every failure is a `Failure` value.
    fn detect(&self, image: &EncodedImage) -> DetectionResult;
}

/// HTTP client for the detection service.
pub struct HttpDetectionClient {
    base: Url,
    agent: ureq::Agent,
}

impl HttpDetectionClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).context("parse detection service url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported detection service scheme '{}'; expected http or https",
                    other
                ))
            }
        }
        Ok(Self {
            base,
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("build {} url", path))
    }

    fn request_classes(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/classes")?;
        let response = self
            .agent
            .get(url.as_str())
            .call()
            .with_context(|| format!("GET {}", url))?;
        let body = read_response(response)?;
        let classes = parse_class_list(&body).context("parse class list")?;
        if classes.is_empty() {
            return Err(anyhow!("service returned an empty class list"));
        }
        Ok(classes)
    }

    fn request_detect(&self, image: &EncodedImage) -> Result<Vec<u8>> {
        let url = self.endpoint("/detect")?;
        let part =
            MultipartBody::single_file(IMAGE_FIELD, image.filename(), image.mime(), &image.bytes);
        let response = match self
            .agent
            .post(url.as_str())
            .set("Content-Type", &part.content_type())
            .send_bytes(part.as_bytes())
        {
            Ok(response) => response,
            // Error statuses still carry a JSON body with `success: false`.
            Err(ureq::Error::Status(code, response)) => {
                log::debug!("POST {} answered HTTP {}", url, code);
                response
            }
            Err(err) => return Err(anyhow!("POST {} failed: {}", url, err)),
        };
        read_response(response)
    }
}

impl DetectionService for HttpDetectionClient {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    fn fetch_classes(&self) -> Result<Vec<String>> {
        self.request_classes()
            .map_err(|e| MonitorError::CatalogFetchFailed(format!("{:#}", e)).into())
    }

    fn detect(&self, image: &EncodedImage) -> DetectionResult {
        match self.request_detect(image) {
            Ok(body) => parse_detect_response(&body),
            Err(e) => DetectionResult::failure(format!("{:#}", e)),
        }
    }
}

fn read_response(response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .context("read response body")?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(HttpDetectionClient::new("ftp://host").is_err());
        assert!(HttpDetectionClient::new("not a url").is_err());
        assert!(HttpDetectionClient::new("http://127.0.0.1:5000").is_ok());
    }

    #[test]
    fn endpoints_are_rooted_at_the_host() -> Result<()> {
        let client = HttpDetectionClient::new("http://127.0.0.1:5000/ui/")?;
        assert_eq!(
            client.endpoint("/detect")?.as_str(),
            "http://127.0.0.1:5000/detect"
        );
        Ok(())
    }

    #[test]
    fn failure_maps_to_cycle_failed() {
        let err = DetectionResult::failure("boom").into_cycle_result().unwrap_err();
        assert_eq!(err, MonitorError::CycleFailed("boom".into()));
    }
}
