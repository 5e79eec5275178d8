use std::fmt;

use thiserror::Error;

use crate::{encoding::ImageEncodingError, media::MediaError, session::Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RequestCamera,
    CaptureFrame,
    SelectFile,
    Clear,
    Retry,
    SubmitScan,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::RequestCamera => "request_camera",
            Operation::CaptureFrame => "capture_frame",
            Operation::SelectFile => "select_file",
            Operation::Clear => "clear",
            Operation::Retry => "retry",
            Operation::SubmitScan => "submit_scan",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejections of a controller call. Failures the user should see (camera
/// denied, scan errors) are not errors here; they move the session to
/// [`Phase::Failed`].
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{operation} is not allowed while the session is {phase}")]
    InvalidTransition { operation: Operation, phase: Phase },
    #[error("failed to capture camera frame: {0}")]
    Capture(String),
    #[error("failed to encode captured frame: {0}")]
    Encode(#[from] ImageEncodingError),
    #[error("selected file is not a readable image: {0}")]
    UnreadableImage(#[source] image::ImageError),
    #[error("failed to read selected file: {0}")]
    Media(#[from] MediaError),
}

impl ControllerError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, ControllerError::InvalidTransition { .. })
    }
}
