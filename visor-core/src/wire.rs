//! JSON contract of the detection endpoint

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Detection, DetectionResult, DetectionStats};

/// Response envelope of `POST /detect`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 JPEG with boxes burned in, present when `annotated=true` was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<DetectionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
}

impl DetectResponse {
    /// Decode a raw response body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Normalize the envelope into a `DetectionResult`.
    ///
    /// A non-success envelope becomes `Error::Protocol` carrying the server's
    /// error message.
    pub fn into_result(self) -> Result<DetectionResult> {
        if !self.success {
            let message = self
                .error
                .unwrap_or_else(|| "Detection request was not successful".to_string());
            return Err(Error::Protocol(message));
        }

        let annotated_image = match self.image {
            Some(encoded) if !encoded.is_empty() => Some(
                general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| Error::Deserialization(format!("Invalid base64 image: {}", e)))?,
            ),
            _ => None,
        };

        let detections = self.detections.unwrap_or_default();
        let stats = self
            .stats
            .unwrap_or_else(|| DetectionStats::from_detections(&detections));

        Ok(DetectionResult {
            annotated_image,
            detections,
            stats,
        })
    }
}

/// Response of `GET /samples`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleListing {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

impl SampleListing {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

/// Value of the `annotated` form field
pub fn annotated_field(annotated: bool) -> &'static str {
    if annotated {
        "true"
    } else {
        "false"
    }
}
