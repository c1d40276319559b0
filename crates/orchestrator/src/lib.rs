//! Report ingestion pipeline
//!
//! Turns one uploaded site video into a stored report: narrative generation,
//! frame extraction, frame upload, report document, viewer and editor pages.
//! Also hosts the operator-facing image operations on existing reports.

pub mod controller;
pub mod narrative;
pub mod transient;
pub mod viewer;

pub use controller::{AddedImage, IngestionConfig, IngestionController, IngestionResult};
pub use narrative::{
    GeneratedNarrative, HttpNarrativeGenerator, NarrativeGenerator, NarrativeServiceConfig,
};
pub use transient::TransientVideo;
pub use viewer::{ViewerPublisher, ViewerTemplates};

use field_report_common::ProcessingError;
use field_report_storage::StorageError;
use std::path::Path;
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Narrative generation failed: {0}")]
    Generator(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestionError>;

/// Content type derived from a file extension
#[must_use]
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a/report-viewer.html"), "text/html");
        assert_eq!(content_type_for("frame_1.50.JPG"), "image/jpeg");
        assert_eq!(content_type_for("daily_report.json"), "application/json");
        assert_eq!(content_type_for("source_video.mov"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_storage_errors_pass_through() {
        let err: IngestionError = StorageError::NotFound("k".to_string()).into();
        assert_eq!(err.to_string(), "Object not found: k");
    }
}
