//! Detection service wire format.
//!
//! `POST /detect` answers with:
//!
//! ```text
//! { "success": bool,
//!   "predictions": { "<class>": { "avg_confidence": 0..100 }, ... },
//!   "detections": [ { "x", "y", "width", "height", "class", "confidence": 0..1 }, ... ],
//!   "error": "..." }
//! ```
//!
//! `x`/`y` are box centers in source-frame pixels.

use serde::Deserialize;
use std::collections::HashMap;

use super::{ClassStats, DetectionBox, DetectionResult};

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    pub success: bool,
    #[serde(default)]
    pub predictions: Option<HashMap<String, WirePrediction>>,
    #[serde(default)]
    pub detections: Option<Vec<WireDetection>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WirePrediction {
    pub avg_confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct WireDetection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
}

/// Parse a `/detect` response body into a typed result.
///
/// Malformed JSON, a false `success` flag, or a success without a
/// `predictions` object all come back as `Failure`.
pub fn parse_detect_response(payload: &[u8]) -> DetectionResult {
    let response: DetectResponse = match serde_json::from_slice(payload) {
        Ok(response) => response,
        Err(e) => return DetectionResult::failure(format!("malformed response: {}", e)),
    };

    if !response.success {
        return DetectionResult::failure(
            response
                .error
                .unwrap_or_else(|| "service reported failure".to_string()),
        );
    }

    let Some(predictions) = response.predictions else {
        return DetectionResult::failure("malformed response: missing predictions");
    };

    let stats = predictions
        .into_iter()
        .map(|(class, p)| {
            (
                class,
                ClassStats {
                    avg_confidence: p.avg_confidence,
                },
            )
        })
        .collect();

    let boxes = response
        .detections
        .unwrap_or_default()
        .into_iter()
        .map(|d| DetectionBox {
            class: d.class_name,
            confidence: d.confidence,
            center_x: d.x,
            center_y: d.y,
            width: d.width,
            height: d.height,
        })
        .collect();

    DetectionResult::Success { stats, boxes }
}

/// Parse a `/classes` response body: a JSON array of class names.
pub fn parse_class_list(payload: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_RESPONSE: &str = r#"{
        "success": true,
        "predictions": {
            "RBC": { "avg_confidence": 86.4 },
            "WBC": { "avg_confidence": 71.0 }
        },
        "detections": [
            { "x": 100, "y": 100, "width": 40, "height": 20, "class": "RBC", "confidence": 0.91 },
            { "x": 10.5, "y": 20.5, "width": 4, "height": 6, "class": "WBC", "confidence": 0.71 }
        ]
    }"#;

    #[test]
    fn parses_success_response() {
        let result = parse_detect_response(OK_RESPONSE.as_bytes());
        let DetectionResult::Success { stats, boxes } = result else {
            panic!("expected success");
        };
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["RBC"].avg_confidence, 86.4);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class, "RBC");
        assert_eq!(boxes[0].center_x, 100.0);
        assert_eq!(boxes[0].width, 40.0);
        assert_eq!(boxes[1].class, "WBC");
    }

    #[test]
    fn missing_detections_is_an_empty_box_list() {
        let body = br#"{ "success": true, "predictions": {} }"#;
        match parse_detect_response(body) {
            DetectionResult::Success { stats, boxes } => {
                assert!(stats.is_empty());
                assert!(boxes.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn service_failure_carries_error_text() {
        let body = br#"{ "success": false, "error": "model not loaded" }"#;
        assert_eq!(
            parse_detect_response(body),
            DetectionResult::failure("model not loaded")
        );
        let body = br#"{ "success": false }"#;
        assert_eq!(
            parse_detect_response(body),
            DetectionResult::failure("service reported failure")
        );
    }

    #[test]
    fn malformed_bodies_are_failures() {
        let bodies: [&[u8]; 4] = [
            b"not json",
            br#"{ "predictions": {} }"#,
            br#"{ "success": true }"#,
            br#"{ "success": true, "predictions": { "RBC": {} } }"#,
        ];
        for body in bodies {
            assert!(
                parse_detect_response(body).is_failure(),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn class_list_keeps_order() {
        let classes = parse_class_list(br#"["WBC", "RBC", "SA"]"#).unwrap();
        assert_eq!(classes, vec!["WBC", "RBC", "SA"]);
        assert!(parse_class_list(br#"{"classes": []}"#).is_err());
    }
}
