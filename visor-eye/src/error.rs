//! Error types for visor-eye

use thiserror::Error;
use visor_core::Error as CoreError;

/// Error class from the user's point of view; each class has a distinct remedy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Camera blocked, denied or revoked
    Permission,
    /// Detection request failed or was rejected
    Transport,
    /// Wrong kind of file selected
    InputValidation,
    /// Camera missing, busy or otherwise unusable
    Device,
    /// Everything else
    Internal,
}

/// Errors surfaced by capture, detection and rendering
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera permission is blocked for this site")]
    PermissionBlocked,

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera permission was revoked")]
    PermissionRevoked,

    #[error("Camera error: {0}")]
    CameraUnavailable(String),

    #[error("Invalid file: expected {expected}")]
    InvalidFile { expected: &'static str },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Detection rejected: {0}")]
    Rejected(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for VisionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Protocol(message) => VisionError::Rejected(message),
            other => VisionError::Core(other),
        }
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        CoreError::Protocol(format!("Vision error: {}", err))
    }
}

impl VisionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VisionError::PermissionBlocked
            | VisionError::PermissionDenied
            | VisionError::PermissionRevoked => ErrorCategory::Permission,
            VisionError::Transport(_) | VisionError::HttpStatus(_) | VisionError::Rejected(_) => {
                ErrorCategory::Transport
            }
            VisionError::InvalidFile { .. } => ErrorCategory::InputValidation,
            VisionError::CameraUnavailable(_) => ErrorCategory::Device,
            VisionError::Core(CoreError::Deserialization(_)) => ErrorCategory::Transport,
            VisionError::Core(CoreError::InvalidInput(_)) => ErrorCategory::InputValidation,
            _ => ErrorCategory::Internal,
        }
    }

    /// Message shown to the user for this error
    pub fn user_message(&self) -> String {
        match self {
            VisionError::PermissionBlocked => {
                "Camera access is blocked. Please enable camera permission for this site in your browser settings."
                    .to_string()
            }
            VisionError::PermissionDenied => {
                "Camera permission denied. Please allow camera access to use webcam detection."
                    .to_string()
            }
            VisionError::PermissionRevoked => {
                "Camera permission was revoked. Please re-enable it in your browser settings."
                    .to_string()
            }
            VisionError::CameraUnavailable(message) => format!("Could not access webcam: {}", message),
            VisionError::InvalidFile { expected } => format!("Please select {} file", expected),
            VisionError::Rejected(message) => format!("Error: {}", message),
            VisionError::Transport(_) | VisionError::HttpStatus(_) => {
                "Failed to analyze image. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::CameraUnavailable("device busy".to_string());
        assert!(err.to_string().contains("Camera error"));
        assert!(err.to_string().contains("device busy"));
    }

    #[test]
    fn test_permission_and_device_messages_differ() {
        let denied = VisionError::PermissionDenied;
        let device = VisionError::CameraUnavailable("Requested device not found".to_string());
        assert_eq!(denied.category(), ErrorCategory::Permission);
        assert_eq!(device.category(), ErrorCategory::Device);
        assert_ne!(denied.user_message(), device.user_message());
        assert!(device.user_message().contains("Requested device not found"));
    }

    #[test]
    fn test_invalid_file_message() {
        let err = VisionError::InvalidFile { expected: "an image" };
        assert_eq!(err.user_message(), "Please select an image file");
        assert_eq!(err.category(), ErrorCategory::InputValidation);
    }

    #[test]
    fn test_protocol_error_becomes_rejected() {
        let err: VisionError = CoreError::Protocol("Could not process image".to_string()).into();
        match &err {
            VisionError::Rejected(msg) => assert_eq!(msg, "Could not process image"),
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert_eq!(err.user_message(), "Error: Could not process image");
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        match vision_err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_vision_error_to_core_error() {
        let core_err: CoreError = VisionError::PermissionDenied.into();
        match core_err {
            CoreError::Protocol(msg) => {
                assert!(msg.contains("Vision error"));
                assert!(msg.contains("denied"));
            }
            _ => panic!("Expected Protocol error"),
        }
    }
}
