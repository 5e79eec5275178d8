use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
    encoding::EncodedImage,
    settings::{ScanSettings, SettingsError},
};

pub const SCAN_UPLOAD_FIELD: &str = "file";
pub const SCAN_UPLOAD_FILENAME: &str = "monument.jpg";
pub const SCAN_UPLOAD_MIME: &str = "image/jpeg";

/// Raw outcome of one exchange; interpretation of status and body is left to
/// the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("scan request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Network(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_image(&self, image: &EncodedImage) -> Result<TransportResponse, TransportError>;
}

pub struct MissingTransport;

#[async_trait]
impl Transport for MissingTransport {
    async fn post_image(&self, _image: &EncodedImage) -> Result<TransportResponse, TransportError> {
        Err(TransportError::Network(
            "scan transport is unavailable".to_string(),
        ))
    }
}

pub struct HttpTransport {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &ScanSettings) -> Result<Self, TransportError> {
        let timeout = settings.request_timeout();
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: settings.scan_endpoint()?,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Http(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_image(&self, image: &EncodedImage) -> Result<TransportResponse, TransportError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(SCAN_UPLOAD_FILENAME)
            .mime_str(SCAN_UPLOAD_MIME)?;
        let form = Form::new().part(SCAN_UPLOAD_FIELD, part);

        debug!(
            endpoint = %self.endpoint,
            bytes = image.len(),
            "posting scan image"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.map_error(err))?;
        Ok(TransportResponse::new(status, body.to_vec()))
    }
}
