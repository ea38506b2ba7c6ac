//! User-supplied media files and their classification

use bytes::Bytes;
use std::path::Path;

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Broad media class of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    /// Classify by MIME type (`image/*`, `video/*`)
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }

    /// Classify by file extension, using the sample gallery's extension lists
    pub fn from_file_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

/// Best-effort MIME type for a file name
pub fn mime_for_file_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// A file handed to the client by the user (upload, drop or sample)
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Build a file whose MIME type is guessed from its name
    pub fn from_name(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime = mime_for_file_name(&name).to_string();
        Self::new(name, mime, bytes)
    }

    /// Classify the file by its MIME type
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime)
    }

    /// Reject a file whose MIME type is not of the expected kind
    pub fn ensure_kind(&self, expected: MediaKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "{} has type '{}', expected {:?}",
                self.name, self.mime, expected
            )))
        }
    }
}

/// Validate a sample file name before it is put into a URL path
pub fn validate_sample_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(Error::InvalidInput("Invalid sample name".to_string()));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidInput("Sample name contains invalid characters".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("Video/MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Other);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Other);
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(MediaKind::from_file_name("site.JPG"), MediaKind::Image);
        assert_eq!(MediaKind::from_file_name("clip.mov"), MediaKind::Video);
        assert_eq!(MediaKind::from_file_name("notes.txt"), MediaKind::Other);
        assert_eq!(MediaKind::from_file_name("noext"), MediaKind::Other);
    }

    #[test]
    fn test_from_name_guesses_mime() {
        let file = MediaFile::from_name("frame.jpeg", vec![1u8, 2, 3]);
        assert_eq!(file.mime, "image/jpeg");
        assert_eq!(file.kind(), MediaKind::Image);
        assert!(file.ensure_kind(MediaKind::Image).is_ok());
        assert!(file.ensure_kind(MediaKind::Video).is_err());
    }

    #[test]
    fn test_sample_name_validation() {
        assert!(validate_sample_name("site1.jpg").is_ok());
        assert!(validate_sample_name("../secret").is_err());
        assert!(validate_sample_name("a/b.jpg").is_err());
        assert!(validate_sample_name("a\\b.jpg").is_err());
        assert!(validate_sample_name("").is_err());
    }
}
