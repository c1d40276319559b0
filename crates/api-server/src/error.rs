//! Mapping of pipeline errors onto HTTP responses

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use field_report_common::ProcessingError;
use field_report_orchestrator::IngestionError;
use field_report_storage::StorageError;
use tracing::{error, warn};

/// Error returned by every handler, rendered as `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn missing_query(name: &str) -> Self {
        Self::bad_request(format!("Missing '{name}' query parameter."))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                Self::new(StatusCode::NOT_FOUND, format!("Nothing found at key {key}."))
            }
            StorageError::Forbidden { caller, key } => {
                warn!("Auth violation: user {caller} attempted to access {key}");
                Self::new(StatusCode::FORBIDDEN, "Forbidden access.")
            }
            StorageError::DuplicateImage(name) => Self::new(
                StatusCode::CONFLICT,
                format!("Image {name} is already part of the report."),
            ),
            StorageError::InvalidKey(key) => Self::bad_request(format!("Invalid key: {key}")),
            e @ (StorageError::S3Error(_) | StorageError::IoError(_)) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, format!("Storage unavailable: {e}"))
            }
            e @ (StorageError::SerializationError(_) | StorageError::InvalidConfig(_)) => {
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Storage(e) => e.into(),
            IngestionError::InvalidUpload(message) => Self::bad_request(message),
            IngestionError::Processing(ProcessingError::NoTimestamps) => Self::internal(
                "Report generation failed: no moments were selected for frame extraction",
            ),
            e => Self::internal(format!("Report generation failed: {e}")),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_statuses() {
        let cases = [
            (StorageError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (
                StorageError::Forbidden {
                    caller: "u1".into(),
                    key: "users/u2/k".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (StorageError::DuplicateImage("a.jpg".into()), StatusCode::CONFLICT),
            (StorageError::InvalidKey("..".into()), StatusCode::BAD_REQUEST),
            (StorageError::S3Error("timeout".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                StorageError::SerializationError("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_ingestion_error_statuses() {
        let err: ApiError = IngestionError::InvalidUpload("empty".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = IngestionError::Generator("down".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.starts_with("Report generation failed"));

        let err: ApiError =
            IngestionError::Storage(StorageError::NotFound("k".into())).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
