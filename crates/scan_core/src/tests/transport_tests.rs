use super::*;
use std::{io::Cursor, time::Duration};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use shared::error::FailureKind;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Debug)]
struct ReceivedUpload {
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    field_count: usize,
}

#[derive(Clone)]
struct ServerState {
    tx: Arc<Mutex<Option<oneshot::Sender<ReceivedUpload>>>>,
    status: StatusCode,
    body: Value,
    delay: Duration,
}

async fn scan_handler(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut upload: Option<ReceivedUpload> = None;
    let mut field_count = 0;
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        field_count += 1;
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.expect("field bytes").to_vec();
        upload.get_or_insert(ReceivedUpload {
            field: name,
            file_name,
            content_type,
            bytes,
            field_count: 0,
        });
    }

    if let Some(mut upload) = upload {
        upload.field_count = field_count;
        if let Some(tx) = state.tx.lock().await.take() {
            let _ = tx.send(upload);
        }
    }

    tokio::time::sleep(state.delay).await;
    (state.status, Json(state.body.clone()))
}

async fn spawn_scan_service(
    status: StatusCode,
    body: Value,
    delay: Duration,
) -> (String, oneshot::Receiver<ReceivedUpload>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let state = ServerState {
        tx: Arc::new(Mutex::new(Some(tx))),
        status,
        body,
        delay,
    };
    let app = Router::new()
        .route("/scan/", post(scan_handler))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), rx)
}

fn settings_for(base: &str, request_timeout_secs: u64) -> ScanSettings {
    ScanSettings {
        api_base_url: base.to_string(),
        request_timeout_secs,
    }
}

fn jpeg_image() -> EncodedImage {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(10, 10, Rgb([90, 120, 150]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .expect("jpeg");
    EncodedImage::decode(bytes).expect("decode")
}

#[tokio::test]
async fn posts_single_file_field_named_monument_jpg() {
    let (base, upload_rx) = spawn_scan_service(
        StatusCode::OK,
        json!({
            "artwork_id": 7,
            "name": "Colosseum",
            "artist": "Vespasian",
            "description": "Flavian amphitheatre",
            "similarity": 0.8123
        }),
        Duration::ZERO,
    )
    .await;
    let transport = HttpTransport::new(&settings_for(&format!("{base}/"), 5)).expect("transport");
    assert_eq!(transport.endpoint().as_str(), format!("{base}/scan/"));

    let image = jpeg_image();
    let response = transport.post_image(&image).await.expect("response");
    assert_eq!(response.status, 200);
    let result = interpret_scan_response(response).expect("match");
    assert_eq!(result.name, "Colosseum");
    assert_eq!(result.confidence_percent(), "81.2%");

    let upload = upload_rx.await.expect("upload");
    assert_eq!(upload.field, "file");
    assert_eq!(upload.file_name.as_deref(), Some("monument.jpg"));
    assert_eq!(upload.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(upload.bytes, image.bytes());
    assert_eq!(upload.field_count, 1);
}

#[tokio::test]
async fn controller_over_http_reports_status_errors() {
    let (base, _upload_rx) = spawn_scan_service(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "boom" }),
        Duration::ZERO,
    )
    .await;
    let transport = HttpTransport::new(&settings_for(&base, 5)).expect("transport");
    let mut controller = ScanController::new(Arc::new(MissingMediaSource), Arc::new(transport));

    controller
        .select_file(jpeg_image().bytes().to_vec())
        .expect("select");
    controller.submit_scan().await.expect("submit");

    assert_eq!(controller.phase(), Phase::Failed);
    assert_eq!(
        controller.session().error_message(),
        Some("HTTP error! status: 500")
    );
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport =
        HttpTransport::new(&settings_for(&format!("http://{addr}"), 5)).expect("transport");
    let mut controller = ScanController::new(Arc::new(MissingMediaSource), Arc::new(transport));

    controller
        .select_file(jpeg_image().bytes().to_vec())
        .expect("select");
    controller.submit_scan().await.expect("submit");

    let failure = controller.session().failure().expect("failure");
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(!failure.message.is_empty());
    assert!(controller.session().image().is_some());
}

#[tokio::test]
async fn hung_service_hits_request_timeout() {
    let (base, _upload_rx) = spawn_scan_service(
        StatusCode::OK,
        json!({ "message": "too late" }),
        Duration::from_secs(5),
    )
    .await;
    let transport = HttpTransport::new(&settings_for(&base, 1)).expect("transport");

    let err = transport
        .post_image(&jpeg_image())
        .await
        .expect_err("timeout");
    assert!(matches!(err, TransportError::Timeout(_)), "{err}");
    assert_eq!(err.to_string(), "scan request timed out after 1s");
}
