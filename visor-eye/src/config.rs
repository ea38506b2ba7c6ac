//! Configuration for visor-eye

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::VisionError;

/// Frame sampling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Only every Nth rendering tick is a candidate frame
    pub skip_interval: u64,
    /// Minimum wall time between two dispatched frames
    pub min_interval_ms: u64,
    /// Rendering tick rate of the host (display refresh)
    pub tick_rate_hz: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            skip_interval: 3,
            min_interval_ms: 250,
            tick_rate_hz: 60,
        }
    }
}

impl SamplingConfig {
    /// Interval between two rendering ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate_hz.max(1) as u64)
    }
}

/// Webcam acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
    /// JPEG quality (1-100) of frames sent from the camera
    pub jpeg_quality: u8,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            ideal_frame_rate: 30,
            jpeg_quality: 40,
        }
    }
}

/// Recorded-video playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub playback_rate: f32,
    /// JPEG quality (1-100) of frames sent from the video
    pub jpeg_quality: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            playback_rate: 0.5,
            jpeg_quality: 50,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisorConfig {
    /// Base URL of the detection service
    pub endpoint: String,
    pub sampling: SamplingConfig,
    pub webcam: WebcamConfig,
    pub video: VideoConfig,
    /// Ask the server for pre-annotated images on streaming frames
    pub annotated: bool,
    /// Per-request timeout; `None` leaves the request unbounded
    pub request_timeout_ms: Option<u64>,
    /// File holding persisted preferences
    pub state_path: PathBuf,
}

impl Default for VisorConfig {
    fn default() -> Self {
        let state_path = dirs::config_dir()
            .map(|mut p| {
                p.push("visor");
                p.push("preferences.json");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./visor-preferences.json"));

        Self {
            endpoint: "http://localhost:5000".to_string(),
            sampling: SamplingConfig::default(),
            webcam: WebcamConfig::default(),
            video: VideoConfig::default(),
            annotated: false,
            request_timeout_ms: None,
            state_path,
        }
    }
}

impl VisorConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let text = std::fs::read_to_string(path)?;
        let config: VisorConfig = toml::from_str(&text)
            .map_err(|e| VisionError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate().map_err(VisionError::Config)?;
        Ok(config)
    }

    /// Per-request timeout; `None` waits indefinitely
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err("Endpoint must use http or https".to_string());
        }

        if self.sampling.skip_interval == 0 {
            return Err("Skip interval must be at least 1".to_string());
        }

        if self.sampling.tick_rate_hz == 0 || self.sampling.tick_rate_hz > 240 {
            return Err("Tick rate must be between 1 and 240".to_string());
        }

        for (name, quality) in [("webcam", self.webcam.jpeg_quality), ("video", self.video.jpeg_quality)] {
            if quality == 0 || quality > 100 {
                return Err(format!("{} JPEG quality must be between 1 and 100", name));
            }
        }

        if !(self.video.playback_rate > 0.0 && self.video.playback_rate <= 16.0) {
            return Err("Playback rate must be in (0, 16]".to_string());
        }

        if self.webcam.ideal_width == 0 || self.webcam.ideal_height == 0 {
            return Err("Camera resolution must be non-zero".to_string());
        }

        if self.request_timeout_ms == Some(0) {
            return Err("Request timeout must be non-zero when set".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = VisorConfig::default();
        assert_eq!(config.sampling.skip_interval, 3);
        assert_eq!(config.sampling.min_interval_ms, 250);
        assert_eq!(config.webcam.jpeg_quality, 40);
        assert_eq!(config.video.jpeg_quality, 50);
        assert_eq!(config.video.playback_rate, 0.5);
        assert_eq!((config.webcam.ideal_width, config.webcam.ideal_height), (1280, 720));
        assert!(!config.annotated);
        assert!(config.request_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_skip_interval_zero() {
        let mut config = VisorConfig::default();
        config.sampling.skip_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_tick_rate() {
        let mut config = VisorConfig::default();
        config.sampling.tick_rate_hz = 0;
        assert!(config.validate().is_err());
        config.sampling.tick_rate_hz = 241;
        assert!(config.validate().is_err());
        config.sampling.tick_rate_hz = 240;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_quality() {
        let mut config = VisorConfig::default();
        config.webcam.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.webcam.jpeg_quality = 100;
        config.video.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_endpoint() {
        let mut config = VisorConfig::default();
        config.endpoint = "ftp://detector".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_timeout_and_rate() {
        let mut config = VisorConfig::default();
        config.request_timeout_ms = Some(0);
        assert!(config.validate().is_err());
        config.request_timeout_ms = Some(5000);
        config.video.playback_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_period() {
        let sampling = SamplingConfig { tick_rate_hz: 50, ..Default::default() };
        assert_eq!(sampling.tick_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_partial_toml() {
        let config: VisorConfig = toml::from_str(
            r#"
            endpoint = "http://detector:5000"
            annotated = true

            [sampling]
            min_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://detector:5000");
        assert!(config.annotated);
        assert_eq!(config.sampling.min_interval_ms, 500);
        assert_eq!(config.sampling.skip_interval, 3);
        assert_eq!(config.video.playback_rate, 0.5);
    }
}
