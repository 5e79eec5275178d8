//! Plain-text renderer for scan session snapshots.

use std::io::Write;

use scan_core::{Phase, SessionSnapshot, View};
use serde_json::{json, Value};
use tracing::warn;

pub struct TerminalView<W: Write + Send> {
    out: W,
    quiet: bool,
    last: Option<SessionSnapshot>,
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W, quiet: bool) -> Self {
        Self {
            out,
            quiet,
            last: None,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> View for TerminalView<W> {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if self.quiet || self.last.as_ref() == Some(snapshot) {
            return;
        }
        self.last = Some(snapshot.clone());

        for line in render_lines(snapshot) {
            if let Err(err) = writeln!(self.out, "{line}") {
                warn!(error = %err, "terminal view write failed");
                return;
            }
        }
        let _ = self.out.flush();
    }
}

pub fn render_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    match snapshot.phase {
        Phase::Idle if snapshot.in_flight => vec!["Requesting camera access...".to_string()],
        Phase::Idle => vec!["Upload or capture an image to identify a monument.".to_string()],
        Phase::CameraActive => vec!["Camera active; capturing photo.".to_string()],
        Phase::ImageReady => match &snapshot.image {
            Some(image) => {
                let (width, height) = image.dimensions();
                vec![format!(
                    "Selected image: {} {width}x{height} ({} bytes)",
                    image.mime_type(),
                    image.len()
                )]
            }
            None => vec!["Selected image".to_string()],
        },
        Phase::Scanning => vec!["Scanning...".to_string()],
        Phase::Succeeded => match &snapshot.result {
            Some(result) => vec![
                format!("Match Confidence: {}", result.confidence_percent()),
                format!("Title: {}", result.name),
                format!("Artist: {}", result.creator),
                format!("Description: {}", result.description),
            ],
            None => Vec::new(),
        },
        Phase::Failed => vec![format!(
            "Error: {}",
            snapshot.error_message().unwrap_or_default()
        )],
    }
}

pub fn outcome_json(snapshot: &SessionSnapshot) -> Value {
    json!({
        "session_id": snapshot.session_id,
        "phase": snapshot.phase.as_str(),
        "result": snapshot.result,
        "error": snapshot.failure,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scan_core::{EncodedImage, RawFrame};
    use shared::{
        domain::{ArtworkId, MatchResult, SessionId},
        error::ScanFailure,
    };

    use super::*;

    fn snapshot(phase: Phase) -> SessionSnapshot {
        SessionSnapshot {
            session_id: SessionId::new(),
            phase,
            in_flight: false,
            camera_active: false,
            image: None,
            result: None,
            failure: None,
        }
    }

    fn eiffel() -> MatchResult {
        MatchResult {
            id: ArtworkId(1),
            name: "Eiffel Tower".into(),
            creator: "Gustave Eiffel".into(),
            description: "Wrought-iron lattice tower".into(),
            confidence: 0.94,
        }
    }

    #[test]
    fn renders_match_details() {
        let mut done = snapshot(Phase::Succeeded);
        done.result = Some(eiffel());
        assert_eq!(
            render_lines(&done),
            vec![
                "Match Confidence: 94.0%",
                "Title: Eiffel Tower",
                "Artist: Gustave Eiffel",
                "Description: Wrought-iron lattice tower",
            ]
        );
    }

    #[test]
    fn skips_repeated_snapshot_and_honours_quiet() {
        let mut failed = snapshot(Phase::Failed);
        failed.failure = Some(ScanFailure::http_status(500));

        let mut view = TerminalView::new(Vec::new(), false);
        view.render(&snapshot(Phase::Scanning));
        view.render(&failed);
        view.render(&failed);
        let printed = String::from_utf8(view.into_inner()).expect("utf8");
        assert_eq!(printed, "Scanning...\nError: HTTP error! status: 500\n");

        let mut quiet = TerminalView::new(Vec::new(), true);
        quiet.render(&failed);
        assert!(quiet.into_inner().is_empty());
    }

    #[test]
    fn reselecting_an_image_prints_the_new_selection() {
        let frame = |width: u32, height: u32| {
            let image = EncodedImage::from_frame(&RawFrame {
                width,
                height,
                pixels: vec![120; (width * height * 3) as usize],
            })
            .expect("encode");
            Arc::new(image)
        };
        let mut first = snapshot(Phase::ImageReady);
        first.image = Some(frame(2, 2));
        let mut second = first.clone();
        second.image = Some(frame(3, 1));

        let mut view = TerminalView::new(Vec::new(), false);
        view.render(&first);
        view.render(&second);
        view.render(&second);
        let printed = String::from_utf8(view.into_inner()).expect("utf8");
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 2, "{printed}");
        assert!(lines[0].starts_with("Selected image: image/jpeg 2x2"), "{printed}");
        assert!(lines[1].starts_with("Selected image: image/jpeg 3x1"), "{printed}");
    }

    #[test]
    fn outcome_json_uses_service_field_names() {
        let mut done = snapshot(Phase::Succeeded);
        done.result = Some(eiffel());
        let value = outcome_json(&done);
        assert_eq!(value["phase"], "succeeded");
        assert_eq!(value["result"]["artwork_id"], 1);
        assert_eq!(value["result"]["similarity"], 0.94);
        assert!(value["error"].is_null());
    }
}
