//! Detection service client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use tracing::{debug, warn};
use visor_core::media::{mime_for_file_name, validate_sample_name};
use visor_core::wire::annotated_field;
use visor_core::{CaptureMode, DetectResponse, DetectionResult, MediaFile, SampleListing};

use crate::config::VisorConfig;
use crate::error::VisionError;

/// One image submitted for detection
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub image: Bytes,
    pub file_name: String,
    pub mime: String,
    pub mode: CaptureMode,
    pub annotated: bool,
}

impl DetectRequest {
    /// A JPEG frame captured from a streaming source
    pub fn frame(mode: CaptureMode, jpeg: Vec<u8>, annotated: bool) -> Self {
        let file_name = match mode {
            CaptureMode::Webcam => "webcam.jpg",
            _ => "video_frame.jpg",
        };
        Self {
            image: Bytes::from(jpeg),
            file_name: file_name.to_string(),
            mime: "image/jpeg".to_string(),
            mode,
            annotated,
        }
    }

    /// A file uploaded by the user; always asks for the annotated image
    pub fn upload(file: &MediaFile) -> Self {
        Self {
            image: file.bytes.clone(),
            file_name: file.name.clone(),
            mime: file.mime.clone(),
            mode: CaptureMode::Image,
            annotated: true,
        }
    }
}

/// Anything that turns a [`DetectRequest`] into detections
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    async fn detect(&self, request: DetectRequest) -> Result<DetectionResult, VisionError>;
}

/// HTTP client of the detection service
#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    client: Client,
    base_url: Url,
}

impl HttpDetectionClient {
    /// Build a client for `config.endpoint` with its request timeout
    pub fn new(config: &VisorConfig) -> Result<Self, VisionError> {
        let mut base_url = Url::parse(&config.endpoint)
            .map_err(|e| VisionError::Config(format!("Invalid endpoint '{}': {}", config.endpoint, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, VisionError> {
        self.base_url
            .join(path)
            .map_err(|e| VisionError::Config(format!("Invalid request path '{}': {}", path, e)))
    }

    /// Names of the sample media offered by the service
    pub async fn list_samples(&self) -> Result<SampleListing, VisionError> {
        let response = self.client.get(self.url("samples")?).send().await?;
        if !response.status().is_success() {
            return Err(VisionError::HttpStatus(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice::<SampleListing>(&body).map_err(visor_core::Error::from)?)
    }

    /// Download one sample file
    pub async fn fetch_sample(&self, name: &str) -> Result<MediaFile, VisionError> {
        validate_sample_name(name)?;
        let response = self.client.get(self.url(&format!("sample/{}", name))?).send().await?;
        if !response.status().is_success() {
            return Err(VisionError::HttpStatus(response.status().as_u16()));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty() && v != "application/octet-stream")
            .unwrap_or_else(|| mime_for_file_name(name).to_string());
        let bytes = response.bytes().await?;
        debug!("Fetched sample {} ({} bytes, {})", name, bytes.len(), mime);

        Ok(MediaFile::new(name, mime, bytes))
    }
}

#[async_trait]
impl DetectionBackend for HttpDetectionClient {
    async fn detect(&self, request: DetectRequest) -> Result<DetectionResult, VisionError> {
        let part = Part::bytes(request.image.to_vec())
            .file_name(request.file_name)
            .mime_str(&request.mime)?;
        let form = Form::new()
            .part("image", part)
            .text("mode", request.mode.as_str())
            .text("annotated", annotated_field(request.annotated));

        let response = self
            .client
            .post(self.url("detect")?)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Error envelopes carry a message even on non-2xx responses
        match DetectResponse::from_slice(&body) {
            Ok(envelope) => Ok(envelope.into_result()?),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => {
                warn!("Detection request failed with HTTP {}", status);
                Err(VisionError::HttpStatus(status.as_u16()))
            }
        }
    }
}
