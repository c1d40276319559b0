/// Common types shared by the frame extractor, the report store and the API server
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Processing errors raised while turning a video into frames
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Video not found or unreadable: {path}")]
    VideoNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No valid timestamps provided for frame extraction")]
    NoTimestamps,

    #[error("Invalid timestamp data in {path}: {message}")]
    InvalidTimestampData { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// A moment in the video chosen by the narrative generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampSelection {
    /// Offset into the video in seconds
    pub timestamp: f64,
    /// Human-readable reason, later used as the image caption
    pub reason: String,
}

impl TimestampSelection {
    pub fn new(timestamp: f64, reason: impl Into<String>) -> Self {
        Self {
            timestamp,
            reason: reason.into(),
        }
    }
}

/// On-disk list of timestamps, as written next to the extracted frames
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameTimestamps {
    #[serde(default)]
    pub timestamps: Vec<TimestampSelection>,
}

/// Deterministic frame file name for a timestamp (`frame_1.50.jpg`)
#[must_use]
pub fn frame_file_name(timestamp: f64) -> String {
    format!("frame_{}.jpg", timestamp_label(timestamp))
}

/// Two-decimal label used to match frames back to their selection
#[must_use]
pub fn timestamp_label(timestamp: f64) -> String {
    format!("{timestamp:.2}")
}

/// A frame that was decoded and written to local disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFrame {
    pub timestamp: f64,
    pub file_path: PathBuf,
}

impl ExtractedFrame {
    /// File name component of the frame path
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_path.file_name().and_then(|s| s.to_str())
    }
}

/// An image referenced by a report document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    /// Unique within one document
    pub file_name: String,
    #[serde(default)]
    pub caption: String,
    #[serde(alias = "s3Url")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedBy {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// Descriptive header of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub customer: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<PreparedBy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueItem {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The structured report persisted as one JSON object per report folder.
///
/// Fields not modelled here (anything an editor adds) are kept in `extra`
/// so they survive a read-modify-write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    #[serde(alias = "reportMetadata")]
    pub metadata: ReportMetadata,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub work_completed: Vec<String>,
    #[serde(default)]
    pub issues: Vec<IssueItem>,
    #[serde(default)]
    pub materials: Vec<MaterialItem>,
    #[serde(default)]
    pub safety_observations: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub asset_base_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ReportDocument {
    /// Look up an image by file name
    #[must_use]
    pub fn image(&self, file_name: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|img| img.file_name == file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> ReportDocument {
        ReportDocument {
            metadata: ReportMetadata {
                generated_at: chrono::Utc::now(),
                customer: "Acme".to_string(),
                project: "Tower".to_string(),
                report_title: Some("Daily Report".to_string()),
                report_date: None,
                prepared_by: None,
            },
            narrative: "Poured level 3 slab.".to_string(),
            work_completed: vec!["Formwork".to_string()],
            issues: vec![IssueItem {
                description: "Rebar delivery late".to_string(),
                severity: Some("medium".to_string()),
                status: None,
            }],
            materials: vec![],
            safety_observations: "All PPE worn.".to_string(),
            next_steps: vec![],
            images: vec![ImageAsset {
                file_name: "frame_1.50.jpg".to_string(),
                caption: "Slab edge".to_string(),
                url: "https://bucket.example/frame_1.50.jpg".to_string(),
            }],
            asset_base_url: "https://bucket.example/users/u1".to_string(),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_frame_file_name_uses_two_decimals() {
        assert_eq!(frame_file_name(1.5), "frame_1.50.jpg");
        assert_eq!(frame_file_name(3.0), "frame_3.00.jpg");
        assert_eq!(frame_file_name(12.345_6), "frame_12.35.jpg");
    }

    #[test]
    fn test_report_document_uses_camel_case() {
        let json = serde_json::to_value(sample_document()).unwrap();
        assert!(json.get("workCompleted").is_some());
        assert!(json.get("safetyObservations").is_some());
        assert!(json.get("assetBaseUrl").is_some());
        assert_eq!(json["images"][0]["fileName"], "frame_1.50.jpg");
    }

    #[test]
    fn test_image_asset_accepts_legacy_s3_url() {
        let json = r#"{"fileName": "a.jpg", "caption": "", "s3Url": "https://x/a.jpg"}"#;
        let image: ImageAsset = serde_json::from_str(json).unwrap();
        assert_eq!(image.url, "https://x/a.jpg");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let mut value = serde_json::to_value(sample_document()).unwrap();
        value["weather"] = serde_json::json!({"tempC": 18});

        let doc: ReportDocument = serde_json::from_value(value).unwrap();
        assert!(doc.extra.contains_key("weather"));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["weather"]["tempC"], 18);
    }

    #[test]
    fn test_report_metadata_legacy_name() {
        let json = r#"{
            "reportMetadata": {"generatedAt": "2025-01-01T00:00:00Z", "customer": "Acme", "project": "Tower"},
            "narrative": "ok"
        }"#;
        let doc: ReportDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.metadata.customer, "Acme");
        assert!(!doc.extra.contains_key("reportMetadata"));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["metadata"]["project"], "Tower");
    }

    #[test]
    fn test_image_lookup() {
        let doc = sample_document();
        assert!(doc.image("frame_1.50.jpg").is_some());
        assert!(doc.image("missing.jpg").is_none());
    }
}
