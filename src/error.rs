// Dispatcher error types
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

pub const UNKNOWN_SERVER_ERROR: &str = "Unknown server error";

/// Body fields probed for a human-readable message, highest priority first
pub const MESSAGE_FIELDS: [&str; 4] = ["detail", "message", "error_description", "error"];

/// Status carried by a normalized error: an HTTP code, or a label when the
/// failure never produced one (e.g. "FETCH_ERROR")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorStatus {
    Code(u16),
    Label(String),
}

impl ErrorStatus {
    pub fn code(&self) -> Option<u16> {
        match self {
            ErrorStatus::Code(code) => Some(*code),
            ErrorStatus::Label(_) => None,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStatus::Code(code) => write!(f, "{}", code),
            ErrorStatus::Label(label) => write!(f, "{}", label),
        }
    }
}

/// The uniform `{status, data}` shape every failure converges to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("request failed with status {status}: {}", describe_data(.data))]
pub struct NormalizedError {
    pub status: ErrorStatus,
    pub data: Value,
}

impl NormalizedError {
    pub fn new(status: ErrorStatus, data: impl Into<Value>) -> Self {
        Self {
            status,
            data: data.into(),
        }
    }

    pub fn with_code(code: u16, data: impl Into<Value>) -> Self {
        Self::new(ErrorStatus::Code(code), data)
    }

    /// Anything that is not already normalized becomes a 500 with its message
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::with_code(500, message.to_string())
    }

    /// Build from an error response, extracting the most specific message
    pub fn from_response(status: ErrorStatus, body: &Value) -> Self {
        Self::new(status, extract_message(body))
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status.code()
    }
}

/// Failure exactly as the transport captured it: status plus the full decoded body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFailure {
    pub status: ErrorStatus,
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Startup-ordering bug: an authenticated call ran before a store was wired in
    #[error("credential store has not been initialized")]
    StoreNotInitialized,

    #[error(transparent)]
    Normalized(#[from] NormalizedError),

    /// Error from an endpoint whose consumers need the untouched body
    #[error("upstream error ({})", .0.status)]
    Passthrough(RawFailure),

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
}

impl DispatchError {
    pub fn status(&self) -> Option<&ErrorStatus> {
        match self {
            DispatchError::Normalized(err) => Some(&err.status),
            DispatchError::Passthrough(raw) => Some(&raw.status),
            DispatchError::StoreNotInitialized
            | DispatchError::Cancelled
            | DispatchError::ClientBuild(_) => None,
        }
    }

    /// `{status, data}` view for the query-cache seam
    pub fn to_json(&self) -> Value {
        match self {
            DispatchError::Normalized(err) => serde_json::json!({
                "status": err.status,
                "data": err.data,
            }),
            DispatchError::Passthrough(raw) => serde_json::json!({
                "status": raw.status,
                "data": raw.data,
            }),
            other => serde_json::json!({
                "status": "CLIENT_ERROR",
                "data": other.to_string(),
            }),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotInitialized => DispatchError::StoreNotInitialized,
            other => DispatchError::Normalized(NormalizedError::internal(other)),
        }
    }
}

/// Probe an error body for the conventional message fields
pub fn extract_message(body: &Value) -> String {
    if let Value::Object(map) = body {
        for field in MESSAGE_FIELDS {
            match map.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
                Some(Value::Null) | None => continue,
                Some(Value::String(_)) => continue,
                Some(other) => return other.to_string(),
            }
        }
    }
    UNKNOWN_SERVER_ERROR.to_string()
}

fn describe_data(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
