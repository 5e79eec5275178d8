use serde_json::Value;
use thiserror::Error;

use crate::domain::MatchResult;

/// Fields the recognition service uses to report a scan it could not match.
/// Checked in order; the first one carrying text wins.
const REPORTED_ERROR_FIELDS: [&str; 2] = ["error", "message"];

/// Interpretation of a successful (2xx) `/scan/` response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanReply {
    Matched(MatchResult),
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ScanReplyError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected scan response: expected a JSON object")]
    NotAnObject,
}

impl ScanReply {
    pub fn from_slice(body: &[u8]) -> Result<Self, ScanReplyError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ScanReplyError> {
        let Value::Object(fields) = &value else {
            return Err(ScanReplyError::NotAnObject);
        };

        for key in REPORTED_ERROR_FIELDS {
            if let Some(text) = fields.get(key).and_then(reported_text) {
                return Ok(Self::Rejected(text));
            }
        }

        let mut result: MatchResult = serde_json::from_value(value)?;
        // raw cosine similarity can fall below zero
        result.confidence = result.confidence.clamp(0.0, 1.0);
        Ok(Self::Matched(result))
    }
}

fn reported_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
