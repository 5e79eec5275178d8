use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear sensor on phones and tablets.
    #[default]
    Environment,
    User,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraConstraints {
    pub facing: FacingMode,
}

impl CameraConstraints {
    pub fn rear_preferred() -> Self {
        Self {
            facing: FacingMode::Environment,
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera device available: {0}")]
    NoDevice(String),
    #[error("camera device error: {0}")]
    Device(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Uncompressed RGB8 still taken from a camera stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Live camera feed. Dropping a stream without calling [`CameraStream::stop`]
/// leaks the device, so sessions only hold streams through an owning guard.
pub trait CameraStream: Send {
    fn label(&self) -> &str;
    fn resolution(&self) -> (u32, u32);
    fn grab_frame(&mut self) -> Result<RawFrame, MediaError>;
    /// Stops every track. Must be safe to call more than once.
    fn stop(&mut self);
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open_camera(
        &self,
        constraints: CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, MediaError>;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, MediaError> {
        Ok(tokio::fs::read(path).await?)
    }
}

pub struct MissingMediaSource;

#[async_trait]
impl MediaSource for MissingMediaSource {
    async fn open_camera(
        &self,
        _constraints: CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, MediaError> {
        Err(MediaError::NoDevice("camera backend is unavailable".into()))
    }
}

/// Camera whose sensor is an image file on disk. Each opened stream decodes the
/// file once and serves that picture as every frame.
pub struct StillImageCamera {
    device: PathBuf,
}

impl StillImageCamera {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

#[async_trait]
impl MediaSource for StillImageCamera {
    async fn open_camera(
        &self,
        constraints: CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, MediaError> {
        let device = self.device.display().to_string();
        let bytes = match tokio::fs::read(&self.device).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::NoDevice(device));
            }
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(MediaError::PermissionDenied(device));
            }
            Err(err) => return Err(err.into()),
        };

        let picture = image::load_from_memory(&bytes)
            .map_err(|err| MediaError::Device(format!("{device}: {err}")))?
            .to_rgb8();
        debug!(
            device = %device,
            facing = ?constraints.facing,
            "still-image camera ignores facing constraint"
        );
        info!(
            device = %device,
            width = picture.width(),
            height = picture.height(),
            "camera stream opened"
        );

        Ok(Box::new(StillImageStream {
            label: device,
            picture,
            stopped: false,
        }))
    }
}

struct StillImageStream {
    label: String,
    picture: RgbImage,
    stopped: bool,
}

impl CameraStream for StillImageStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> (u32, u32) {
        self.picture.dimensions()
    }

    fn grab_frame(&mut self) -> Result<RawFrame, MediaError> {
        if self.stopped {
            return Err(MediaError::Device(format!("{} is stopped", self.label)));
        }
        let (width, height) = self.picture.dimensions();
        Ok(RawFrame {
            width,
            height,
            pixels: self.picture.as_raw().clone(),
        })
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            debug!(device = %self.label, "camera tracks stopped");
        }
    }
}
