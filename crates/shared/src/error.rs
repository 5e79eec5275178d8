use serde::{Deserialize, Serialize};

pub const CAMERA_UNAVAILABLE_MESSAGE: &str =
    "Could not access camera. Please upload an image instead.";
pub const SCAN_FALLBACK_MESSAGE: &str = "Failed to scan monument. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CameraUnavailable,
    HttpStatus,
    ServiceReported,
    Transport,
}

/// User-facing failure carried by a session in the `Failed` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn camera_unavailable() -> Self {
        Self::new(FailureKind::CameraUnavailable, CAMERA_UNAVAILABLE_MESSAGE)
    }

    pub fn http_status(status: u16) -> Self {
        Self::new(
            FailureKind::HttpStatus,
            format!("HTTP error! status: {status}"),
        )
    }

    pub fn service_reported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServiceReported, message)
    }

    /// Transport-level failure; an empty description falls back to the generic scan message.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::new(FailureKind::Transport, SCAN_FALLBACK_MESSAGE)
        } else {
            Self::new(FailureKind::Transport, message)
        }
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
