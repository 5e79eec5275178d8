use std::{path::Path, sync::Arc, time::Instant};

use shared::{
    domain::MatchResult,
    error::ScanFailure,
    protocol::ScanReply,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub mod encoding;
pub mod error;
pub mod media;
pub mod session;
pub mod settings;
pub mod transport;
pub mod view;

pub use encoding::EncodedImage;
pub use error::{ControllerError, Operation};
pub use media::{
    CameraConstraints, CameraStream, FacingMode, MediaError, MediaSource, MissingMediaSource,
    RawFrame, StillImageCamera,
};
pub use session::{Phase, Session, SessionSnapshot};
pub use settings::{load_settings, ScanSettings, SettingsError};
pub use transport::{HttpTransport, MissingTransport, Transport, TransportError, TransportResponse};
pub use view::{drive_view, View};

use session::ActiveCamera;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Drives one scan session: acquisition (camera or file), submission, and the
/// resulting phase. Every state change is published as a [`SessionSnapshot`].
///
/// Operations take `&mut self`, so a second call cannot start while a
/// suspended one (`request_camera`, `submit_scan`) is outstanding. Dropping
/// a suspended call abandons it: a scan goes back to `ImageReady`, a camera
/// request back to `Idle`.
pub struct ScanController {
    session: Session,
    media: Arc<dyn MediaSource>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionSnapshot>,
}

impl ScanController {
    pub fn new(media: Arc<dyn MediaSource>, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let session = Session::new();
        info!(session_id = %session.id(), "scan session started");
        Self {
            session,
            media,
            transport,
            events,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    pub async fn request_camera(&mut self) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::RequestCamera, &[Phase::Idle])?;

        self.session.begin_camera_request();
        self.publish();

        let media = Arc::clone(&self.media);
        let mut pending = PendingOperation::new(&mut self.session, &self.events);
        match media.open_camera(CameraConstraints::rear_preferred()).await {
            Ok(stream) => {
                let (width, height) = stream.resolution();
                info!(
                    session_id = %pending.session().id(),
                    device = stream.label(),
                    width,
                    height,
                    "camera active"
                );
                pending.session().attach_camera(ActiveCamera::new(stream));
            }
            Err(err) => {
                warn!(session_id = %pending.session().id(), error = %err, "camera unavailable");
                pending.session().fail(ScanFailure::camera_unavailable());
            }
        }
        pending.settle();
        Ok(())
    }

    /// Grabs the current frame at the stream's native resolution, encodes it as
    /// JPEG and releases the camera before the session reports `ImageReady`.
    /// On error the stream stays live and the session stays `CameraActive`.
    pub fn capture_frame(&mut self) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::CaptureFrame, &[Phase::CameraActive])?;

        let Some(stream) = self.session.camera_mut().and_then(ActiveCamera::stream_mut) else {
            return Err(ControllerError::Capture("no live camera stream".into()));
        };
        let (width, height) = stream.resolution();
        let frame = stream
            .grab_frame()
            .map_err(|err| ControllerError::Capture(err.to_string()))?;
        if (frame.width, frame.height) != (width, height) {
            return Err(ControllerError::Capture(format!(
                "frame is {}x{} but the stream reports {width}x{height}",
                frame.width, frame.height
            )));
        }
        let image = EncodedImage::from_frame(&frame)?;

        self.session.release_camera();
        info!(
            session_id = %self.session.id(),
            width,
            height,
            bytes = image.len(),
            "frame captured"
        );
        self.session.set_image(Arc::new(image));
        self.publish();
        Ok(())
    }

    pub fn select_file(&mut self, bytes: Vec<u8>) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::SelectFile, &[Phase::Idle, Phase::ImageReady])?;

        let image = EncodedImage::decode(bytes).map_err(ControllerError::UnreadableImage)?;
        let (width, height) = image.dimensions();
        info!(
            session_id = %self.session.id(),
            format = image.mime_type(),
            width,
            height,
            "image selected"
        );
        self.session.set_image(Arc::new(image));
        self.publish();
        Ok(())
    }

    /// Reads `path` through the media source, then behaves like [`Self::select_file`].
    pub async fn select_path(&mut self, path: &Path) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::SelectFile, &[Phase::Idle, Phase::ImageReady])?;
        let bytes = self.media.read_file(path).await?;
        self.select_file(bytes)
    }

    /// Drops any image, result and error. Calling it again from `Idle` is a no-op.
    pub fn clear(&mut self) -> Result<(), ControllerError> {
        if self.session.phase() == Phase::Idle && !self.session.in_flight() {
            return Ok(());
        }
        self.ensure_phase(
            Operation::Clear,
            &[Phase::ImageReady, Phase::Succeeded, Phase::Failed],
        )?;
        self.session.clear();
        self.publish();
        Ok(())
    }

    /// Leaves a finished scan: back to `ImageReady` while an image is held,
    /// otherwise to `Idle`.
    pub fn retry(&mut self) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::Retry, &[Phase::Succeeded, Phase::Failed])?;
        self.session.retry();
        self.publish();
        Ok(())
    }

    pub async fn submit_scan(&mut self) -> Result<(), ControllerError> {
        self.ensure_phase(Operation::SubmitScan, &[Phase::ImageReady])?;
        let Some(image) = self.session.image().cloned() else {
            return Err(self.reject(Operation::SubmitScan));
        };

        self.session.begin_scan();
        self.publish();

        let transport = Arc::clone(&self.transport);
        let mut pending = PendingOperation::new(&mut self.session, &self.events);
        let session_id = pending.session().id();
        let started = Instant::now();
        let outcome = match transport.post_image(&image).await {
            Ok(response) => interpret_scan_response(response),
            Err(err) => {
                error!(session_id = %session_id, error = %err, "scan request failed");
                Err(ScanFailure::transport(err.to_string()))
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                info!(
                    session_id = %session_id,
                    artwork_id = %result.id,
                    confidence = result.confidence,
                    elapsed_ms,
                    "scan matched"
                );
                pending.session().succeed(result);
            }
            Err(failure) => {
                warn!(
                    session_id = %session_id,
                    kind = ?failure.kind,
                    message = %failure.message,
                    elapsed_ms,
                    "scan failed"
                );
                pending.session().fail(failure);
            }
        }
        pending.settle();
        Ok(())
    }

    fn ensure_phase(&self, operation: Operation, allowed: &[Phase]) -> Result<(), ControllerError> {
        if allowed.contains(&self.session.phase()) && !self.session.in_flight() {
            Ok(())
        } else {
            Err(self.reject(operation))
        }
    }

    fn reject(&self, operation: Operation) -> ControllerError {
        let phase = self.session.phase();
        warn!(
            session_id = %self.session.id(),
            operation = operation.as_str(),
            phase = phase.as_str(),
            "rejected operation"
        );
        ControllerError::InvalidTransition { operation, phase }
    }

    fn publish(&self) {
        publish_snapshot(&self.session, &self.events);
    }
}

fn publish_snapshot(session: &Session, events: &broadcast::Sender<SessionSnapshot>) {
    let snapshot = session.snapshot();
    debug!(
        session_id = %snapshot.session_id,
        phase = snapshot.phase.as_str(),
        in_flight = snapshot.in_flight,
        "session updated"
    );
    // no subscribers is fine
    let _ = events.send(snapshot);
}

/// Holds the session while a suspended operation is outstanding. If the
/// operation's future is dropped before [`PendingOperation::settle`], the
/// session leaves its in-flight state and the rollback is published.
struct PendingOperation<'a> {
    session: &'a mut Session,
    events: &'a broadcast::Sender<SessionSnapshot>,
    settled: bool,
}

impl<'a> PendingOperation<'a> {
    fn new(session: &'a mut Session, events: &'a broadcast::Sender<SessionSnapshot>) -> Self {
        Self {
            session,
            events,
            settled: false,
        }
    }

    fn session(&mut self) -> &mut Session {
        &mut *self.session
    }

    /// Publishes the outcome the operation already applied to the session.
    fn settle(mut self) {
        self.settled = true;
        publish_snapshot(&*self.session, self.events);
    }
}

impl Drop for PendingOperation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            session_id = %self.session.id(),
            phase = self.session.phase().as_str(),
            "operation cancelled before completing"
        );
        self.session.abandon_in_flight();
        publish_snapshot(&*self.session, self.events);
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        if self.session.has_camera() {
            info!(session_id = %self.session.id(), "releasing camera on teardown");
        }
        self.session.release_camera();
    }
}

/// Maps one `/scan/` exchange onto the session outcome.
pub fn interpret_scan_response(response: TransportResponse) -> Result<MatchResult, ScanFailure> {
    if !response.is_success() {
        return Err(ScanFailure::http_status(response.status));
    }
    match ScanReply::from_slice(&response.body) {
        Ok(ScanReply::Matched(result)) => Ok(result),
        Ok(ScanReply::Rejected(message)) => Err(ScanFailure::service_reported(message)),
        Err(err) => Err(ScanFailure::transport(err.to_string())),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod transport_tests;
