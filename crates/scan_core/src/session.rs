use std::{fmt, sync::Arc};

use shared::{
    domain::{MatchResult, SessionId},
    error::{FailureKind, ScanFailure},
};
use tracing::debug;

use crate::{encoding::EncodedImage, media::CameraStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    CameraActive,
    ImageReady,
    Scanning,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::CameraActive => "camera_active",
            Phase::ImageReady => "image_ready",
            Phase::Scanning => "scanning",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owning guard for a live camera stream. The stream is stopped exactly once,
/// either through [`ActiveCamera::release`] or when the guard is dropped.
pub(crate) struct ActiveCamera {
    stream: Option<Box<dyn CameraStream>>,
}

impl ActiveCamera {
    pub(crate) fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut (dyn CameraStream + 'static)> {
        self.stream.as_deref_mut()
    }

    pub(crate) fn release(mut self) {
        self.stop_stream();
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!(device = stream.label(), "camera stream released");
        }
    }
}

impl Drop for ActiveCamera {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// State of one visit to the scan screen.
///
/// Mutators are crate-private and keep the invariants the renderer relies on:
/// `result` only in `Succeeded`, `failure` only in `Failed`, and a camera
/// stream only in `CameraActive`.
pub struct Session {
    id: SessionId,
    phase: Phase,
    in_flight: bool,
    image: Option<Arc<EncodedImage>>,
    camera: Option<ActiveCamera>,
    result: Option<MatchResult>,
    failure: Option<ScanFailure>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            phase: Phase::Idle,
            in_flight: false,
            image: None,
            camera: None,
            result: None,
            failure: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn image(&self) -> Option<&Arc<EncodedImage>> {
        self.image.as_ref()
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&ScanFailure> {
        self.failure.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.message.as_str())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            phase: self.phase,
            in_flight: self.in_flight,
            camera_active: self.camera.is_some(),
            image: self.image.clone(),
            result: self.result.clone(),
            failure: self.failure.clone(),
        }
    }

    pub(crate) fn camera_mut(&mut self) -> Option<&mut ActiveCamera> {
        self.camera.as_mut()
    }

    pub(crate) fn begin_camera_request(&mut self) {
        self.in_flight = true;
    }

    pub(crate) fn attach_camera(&mut self, camera: ActiveCamera) {
        self.release_camera();
        self.image = None;
        self.result = None;
        self.failure = None;
        self.camera = Some(camera);
        self.in_flight = false;
        self.phase = Phase::CameraActive;
    }

    pub(crate) fn release_camera(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera.release();
        }
    }

    /// Replaces the held image. Callers release the camera first.
    pub(crate) fn set_image(&mut self, image: Arc<EncodedImage>) {
        debug_assert!(self.camera.is_none(), "image set while camera active");
        self.image = Some(image);
        self.result = None;
        self.failure = None;
        self.phase = Phase::ImageReady;
    }

    pub(crate) fn begin_scan(&mut self) {
        self.result = None;
        self.failure = None;
        self.in_flight = true;
        self.phase = Phase::Scanning;
    }

    /// Rolls back an operation that was dropped while suspended: a scan returns
    /// to `ImageReady` with its image, a camera request to `Idle`.
    pub(crate) fn abandon_in_flight(&mut self) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;
        if self.phase == Phase::Scanning {
            self.phase = if self.image.is_some() {
                Phase::ImageReady
            } else {
                Phase::Idle
            };
        }
    }

    pub(crate) fn succeed(&mut self, result: MatchResult) {
        self.failure = None;
        self.result = Some(result);
        self.in_flight = false;
        self.phase = Phase::Succeeded;
    }

    /// The image survives failure so the user can resubmit it.
    pub(crate) fn fail(&mut self, failure: ScanFailure) {
        self.release_camera();
        self.result = None;
        self.failure = Some(failure);
        self.in_flight = false;
        self.phase = Phase::Failed;
    }

    pub(crate) fn clear(&mut self) {
        self.image = None;
        self.result = None;
        self.failure = None;
        self.phase = Phase::Idle;
    }

    pub(crate) fn retry(&mut self) {
        self.result = None;
        self.failure = None;
        self.phase = if self.image.is_some() {
            Phase::ImageReady
        } else {
            Phase::Idle
        };
    }
}

/// Immutable copy of everything a renderer may read from a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: Phase,
    pub in_flight: bool,
    pub camera_active: bool,
    pub image: Option<Arc<EncodedImage>>,
    pub result: Option<MatchResult>,
    pub failure: Option<ScanFailure>,
}

impl SessionSnapshot {
    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.message.as_str())
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|failure| failure.kind)
    }

    /// Whether a scan may be submitted from this state.
    pub fn can_submit(&self) -> bool {
        self.phase == Phase::ImageReady && !self.in_flight
    }
}
