//! Error handling for the provisioning client and the local emulator.
//!
//! `StoreError` is what a backend reports for a single round-trip. `ClientError`
//! wraps it with the operation and resource path that failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const DOCUMENT_NOT_FOUND: &str = "DOCUMENT_NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const SERVICE_ERROR: &str = "SERVICE_ERROR";
}

/// Failure of a single request against a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport or network failure
    Connection(String),
    /// Credential rejected
    Authorization(String),
    /// Referenced database or collection absent
    NotFound(String),
    /// Addressed document absent from an existing collection
    DocumentNotFound(String),
    /// Resource with the same id already exists
    Conflict(String),
    /// Malformed request (e.g. a query outside the accepted grammar)
    BadRequest(String),
    /// Document could not be encoded or decoded
    Serialization(String),
    /// Any other non-success response from the service
    Service { status: u16, message: String },
}

impl StoreError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::Connection(_) => StatusCode::BAD_GATEWAY,
            StoreError::Authorization(_) => StatusCode::UNAUTHORIZED,
            StoreError::NotFound(_) | StoreError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StoreError::Serialization(_) => StatusCode::BAD_REQUEST,
            StoreError::Service { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Connection(_) => codes::CONNECTION_ERROR,
            StoreError::Authorization(_) => codes::UNAUTHORIZED,
            StoreError::NotFound(_) => codes::NOT_FOUND,
            StoreError::DocumentNotFound(_) => codes::DOCUMENT_NOT_FOUND,
            StoreError::Conflict(_) => codes::CONFLICT,
            StoreError::BadRequest(_) => codes::BAD_REQUEST,
            StoreError::Serialization(_) => codes::SERIALIZATION_ERROR,
            StoreError::Service { .. } => codes::SERVICE_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            StoreError::Connection(msg) => msg.clone(),
            StoreError::Authorization(msg) => msg.clone(),
            StoreError::NotFound(msg) => msg.clone(),
            StoreError::DocumentNotFound(msg) => msg.clone(),
            StoreError::Conflict(msg) => msg.clone(),
            StoreError::BadRequest(msg) => msg.clone(),
            StoreError::Serialization(msg) => msg.clone(),
            StoreError::Service { message, .. } => message.clone(),
        }
    }

    /// Rebuild an error from a status code and the service's error envelope.
    pub fn from_response(status: StatusCode, body: Option<ErrorResponse>) -> Self {
        let (code, message) = match body {
            Some(b) => (Some(b.code), b.message),
            None => (None, status.to_string()),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Authorization(message),
            StatusCode::NOT_FOUND if code.as_deref() == Some(codes::DOCUMENT_NOT_FOUND) => {
                StoreError::DocumentNotFound(message)
            }
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::CONFLICT => StoreError::Conflict(message),
            StatusCode::BAD_REQUEST => StoreError::BadRequest(message),
            other => StoreError::Service {
                status: other.as_u16(),
                message,
            },
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Transport error: {:?}", err);
        if err.is_decode() {
            StoreError::Serialization(format!("Response decode error: {}", err))
        } else {
            StoreError::Connection(format!("Transport error: {}", err))
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        StoreError::Serialization(format!("JSON error: {}", err))
    }
}

/// Error returned by `ProvisioningClient`, carrying the failing operation and
/// the resource path it was addressed to.
#[derive(Debug)]
pub struct ClientError {
    pub operation: &'static str,
    pub path: String,
    pub source: StoreError,
}

impl ClientError {
    pub fn new(operation: &'static str, path: impl Into<String>, source: StoreError) -> Self {
        Self {
            operation,
            path: path.into(),
            source,
        }
    }

    /// The underlying store failure.
    pub fn kind(&self) -> &StoreError {
        &self.source
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed for '{}'", self.operation, self.path)
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Attach operation context to a backend result.
pub(crate) trait ResultExt<T> {
    fn context(self, operation: &'static str, path: &str) -> Result<T, ClientError>;
}

impl<T> ResultExt<T> for Result<T, StoreError> {
    fn context(self, operation: &'static str, path: &str) -> Result<T, ClientError> {
        self.map_err(|source| ClientError::new(operation, path, source))
    }
}

/// Error envelope returned by the emulator.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &StoreError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.message(),
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::new(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_from_response_maps_statuses() {
        let envelope = |m: &str| {
            Some(ErrorResponse {
                code: "X".to_string(),
                message: m.to_string(),
            })
        };

        assert_eq!(
            StoreError::from_response(StatusCode::UNAUTHORIZED, envelope("bad key")),
            StoreError::Authorization("bad key".to_string())
        );
        assert_eq!(
            StoreError::from_response(StatusCode::FORBIDDEN, None),
            StoreError::Authorization("403 Forbidden".to_string())
        );
        assert_eq!(
            StoreError::from_response(StatusCode::NOT_FOUND, envelope("gone")),
            StoreError::NotFound("gone".to_string())
        );
        assert_eq!(
            StoreError::from_response(StatusCode::CONFLICT, envelope("dup")),
            StoreError::Conflict("dup".to_string())
        );
        assert_eq!(
            StoreError::from_response(StatusCode::SERVICE_UNAVAILABLE, envelope("busy")),
            StoreError::Service {
                status: 503,
                message: "busy".to_string()
            }
        );
    }

    #[test]
    fn test_status_code_round_trips_through_envelope() {
        for err in [
            StoreError::Authorization("a".into()),
            StoreError::NotFound("b".into()),
            StoreError::DocumentNotFound("b2".into()),
            StoreError::Conflict("c".into()),
            StoreError::BadRequest("d".into()),
        ] {
            let rebuilt =
                StoreError::from_response(err.status_code(), Some(ErrorResponse::new(&err)));
            assert_eq!(rebuilt, err);
        }
    }

    #[test]
    fn test_client_error_carries_context() {
        let err = ClientError::new(
            "ensure_collection",
            "dbs/DocumentDbPoc/colls/FamilyCollection",
            StoreError::NotFound("Database DocumentDbPoc not found".to_string()),
        );

        assert_eq!(
            err.to_string(),
            "ensure_collection failed for 'dbs/DocumentDbPoc/colls/FamilyCollection'"
        );
        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("NOT_FOUND: Database DocumentDbPoc not found")
        );
    }
}
